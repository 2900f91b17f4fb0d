//! Scripted in-memory provider for tests and dry runs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{CompletionRequest, CompletionResponse, LLMProvider, ProviderResult};
use super::ProviderKind;
use crate::runner::rate_limiter::RateLimiter;

type Responder = Box<dyn Fn(&CompletionRequest) -> ProviderResult<String> + Send + Sync>;

/// Provider whose replies come from a closure over the request
pub struct ScriptedProvider {
    kind: ProviderKind,
    responder: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
    rate_limiter: Arc<RateLimiter>,
}

impl ScriptedProvider {
    pub fn new<F>(kind: ProviderKind, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> ProviderResult<String> + Send + Sync + 'static,
    {
        Self {
            kind,
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            rate_limiter: Arc::new(RateLimiter::new(u32::MAX, u32::MAX)),
        }
    }

    /// Always reply with the same text
    pub fn fixed(kind: ProviderKind, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(kind, move |_| Ok(reply.clone()))
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let content = (self.responder)(request)?;
        Ok(CompletionResponse {
            output_tokens: content.split_whitespace().count() as u32,
            content,
            model: request.model.clone(),
            input_tokens: 0,
            finish_reason: "stop".to_string(),
            latency_ms: 0,
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;

    #[tokio::test]
    async fn test_scripted_provider_records_requests() {
        let provider = ScriptedProvider::new(ProviderKind::Local, |req| {
            Ok(format!("echo: {}", req.messages[0].content))
        });
        let request = CompletionRequest::new("phi-2", vec![Message::user("hi")], 10);

        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.content, "echo: hi");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.requests()[0].model, "phi-2");
    }
}
