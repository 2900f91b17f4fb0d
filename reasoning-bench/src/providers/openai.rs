//! OpenAI-compatible chat completions client
//!
//! All three provider kinds speak the same `/chat/completions` protocol; they
//! differ only in base URL and credential.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::traits::{
    CompletionRequest, CompletionResponse, JsonSchemaFormat, LLMProvider, Message, ProviderError,
    ProviderResult,
};
use super::{ConnectionParams, Credential, CredentialRef, ProviderKind};
use crate::runner::rate_limiter::RateLimiter;

/// Chat client for any OpenAI-compatible endpoint
pub struct OpenAICompatClient {
    kind: ProviderKind,
    base_url: String,
    credential_ref: CredentialRef,
    api_key: Option<Credential>,
    http_client: Client,
    timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl OpenAICompatClient {
    /// Create a client for a provider; the credential is read from the environment now
    pub fn new(kind: ProviderKind, params: &ConnectionParams, timeout: Duration) -> ProviderResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            kind,
            base_url: params.endpoint.trim_end_matches('/').to_string(),
            credential_ref: params.credential.clone(),
            api_key: params.credential.resolve(),
            http_client,
            timeout,
            rate_limiter: Arc::new(RateLimiter::new(500, 200_000)),
        })
    }

    /// Override the credential (tests, or keys from somewhere other than env)
    pub fn with_api_key(mut self, key: Credential) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Set custom rate limits
    pub fn with_rate_limits(mut self, rpm: u32, tpm: u32) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(rpm, tpm));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Reasoning and GPT-5 models take `max_completion_tokens` and reject `temperature`
fn uses_completion_tokens(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.starts_with("gpt-5")
}

fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3")
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaSpec<'a>,
}

#[derive(Serialize)]
struct JsonSchemaSpec<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

impl<'a> From<&'a JsonSchemaFormat> for ResponseFormat<'a> {
    fn from(format: &'a JsonSchemaFormat) -> Self {
        Self {
            format_type: "json_schema",
            json_schema: JsonSchemaSpec {
                name: &format.name,
                schema: &format.schema,
                strict: false,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[async_trait]
impl LLMProvider for OpenAICompatClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        if self.credential_ref.is_required() && self.api_key.is_none() {
            return Err(ProviderError::Config(format!(
                "{} not set",
                self.credential_ref.env_var.as_deref().unwrap_or("API key")
            )));
        }

        let _guard = self.rate_limiter.acquire().await;
        let start = Instant::now();

        let messages: Vec<ChatMessage> = request.messages.iter().map(ChatMessage::from).collect();
        let completion_tokens = uses_completion_tokens(&request.model);

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: (!completion_tokens).then_some(request.max_tokens),
            max_completion_tokens: completion_tokens.then_some(request.max_tokens),
            temperature: if is_reasoning_model(&request.model) {
                None
            } else {
                Some(request.temperature)
            },
            stop: &request.stop,
            response_format: request.response_format.as_ref().map(ResponseFormat::from),
        };

        tracing::debug!(
            "POST {}/chat/completions model={} structured={}",
            self.base_url,
            request.model,
            request.response_format.is_some()
        );

        let mut http = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {}", key.expose()));
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_ms: self.timeout_ms(),
                }
            } else {
                ProviderError::Http(e)
            }
        })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60)
                * 1000;

            // 429 also signals an exhausted quota, which no amount of waiting fixes
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                let error_type = error.error.error_type.as_deref().unwrap_or("");
                if error_type == "insufficient_quota" {
                    return Err(ProviderError::Config(format!(
                        "{} quota exceeded: {}",
                        self.kind, error.error.message
                    )));
                }
            }

            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };

            if status == 401 || status == 403 {
                return Err(ProviderError::Config(format!(
                    "{} auth error ({}): {}",
                    self.kind,
                    status.as_u16(),
                    message
                )));
            }

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_ms: self.timeout_ms(),
                }
            } else {
                ProviderError::Parse(e.to_string())
            }
        })?;

        let (input_tokens, output_tokens) = api_response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));
        self.rate_limiter.record_tokens(input_tokens + output_tokens).await;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

        let finish_reason = choice.finish_reason.unwrap_or_else(|| "unknown".to_string());
        // Refusals and filtered replies carry a null content
        let content = choice.message.content.ok_or_else(|| {
            ProviderError::Parse(format!("no content in top choice (finish_reason={})", finish_reason))
        })?;

        Ok(CompletionResponse {
            content,
            model: api_response.model.unwrap_or_else(|| request.model.clone()),
            input_tokens,
            output_tokens,
            finish_reason,
            latency_ms,
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_field_selection() {
        assert!(uses_completion_tokens("o3-mini"));
        assert!(uses_completion_tokens("gpt-5.2"));
        assert!(!uses_completion_tokens("gpt-4-1106-preview"));
        assert!(!is_reasoning_model("gpt-5.2"));
    }

    #[test]
    fn test_request_serialization_omits_empty_fields() {
        let stop: Vec<String> = Vec::new();
        let body = ChatRequest {
            model: "phi-2",
            messages: vec![ChatMessage::from(&Message::user("hi"))],
            max_tokens: Some(10),
            max_completion_tokens: None,
            temperature: Some(0.0),
            stop: &stop,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stop").is_none());
        assert!(json.get("response_format").is_none());
        assert!(json.get("max_completion_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_format_shape() {
        let format = JsonSchemaFormat {
            name: "Puzzle".to_string(),
            schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(ResponseFormat::from(&format)).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "Puzzle");
        assert_eq!(json["json_schema"]["schema"]["type"], "object");
    }
}
