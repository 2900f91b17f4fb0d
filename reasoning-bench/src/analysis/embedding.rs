//! Sentence embeddings for semantic answer matching

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::similarity::cosine_similarity;
use crate::error::{BenchError, BenchResult};
use crate::providers::Credential;

/// Encodes texts into dense vectors with one fixed model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for error context
    fn model(&self) -> &str;

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> BenchResult<Vec<Vec<f32>>>;
}

/// Embedding model served behind an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<Credential>,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> BenchResult<Self> {
        let model = model.into();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::EmbeddingModelUnavailable {
                model: model.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model,
            api_key: None,
            http_client,
        })
    }

    pub fn with_api_key(mut self, key: Credential) -> Self {
        self.api_key = Some(key);
        self
    }

    fn unavailable(&self, message: impl Into<String>) -> BenchError {
        BenchError::EmbeddingModelUnavailable {
            model: self.model.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> BenchResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.endpoint);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(self.unavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Cosine similarity of the two texts' embeddings.
///
/// Embedder failures propagate; there is no lexical fallback.
pub async fn semantic_similarity(embedder: &dyn Embedder, reference: &str, candidate: &str) -> BenchResult<f64> {
    let vectors = embedder
        .embed(&[reference.to_string(), candidate.to_string()])
        .await?;

    match vectors.as_slice() {
        [a, b] => {
            if reference == candidate {
                return Ok(1.0);
            }
            Ok(cosine_similarity(a, b))
        }
        _ => Err(BenchError::EmbeddingModelUnavailable {
            model: embedder.model().to_string(),
            message: format!("expected 2 embeddings, got {}", vectors.len()),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Bag-of-letters embedder for tests
    pub(crate) struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model(&self) -> &str {
            "letters"
        }

        async fn embed(&self, texts: &[String]) -> BenchResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    pub(crate) struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _texts: &[String]) -> BenchResult<Vec<Vec<f32>>> {
            Err(BenchError::EmbeddingModelUnavailable {
                model: "broken".to_string(),
                message: "weights not found".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_semantic_similarity_self_is_one() {
        let sim = semantic_similarity(&LetterEmbedder, "Paris", "Paris").await.unwrap();
        assert_eq!(sim, 1.0);
    }

    #[tokio::test]
    async fn test_semantic_similarity_anagram() {
        let sim = semantic_similarity(&LetterEmbedder, "listen", "silent").await.unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let err = semantic_similarity(&BrokenEmbedder, "a", "a").await.unwrap_err();
        assert!(matches!(err, BenchError::EmbeddingModelUnavailable { .. }));
    }
}
