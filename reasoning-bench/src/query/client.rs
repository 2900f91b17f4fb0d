//! Provider-agnostic model queries with optional structured outputs

use std::sync::Arc;

use super::schema::{decode, decode_value, ResponseSchema, StructuredOutput};
use crate::error::{BenchError, BenchResult};
use crate::providers::{
    CompletionRequest, JsonSchemaFormat, Message, ProviderMap, ProviderRegistry, Role,
};

/// Input to one model invocation
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub response_schema: Option<ResponseSchema>,
}

impl QuerySpec {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens: 2000,
            stop: Vec::new(),
            response_schema: None,
        }
    }

    /// Single user message
    pub fn user(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    fn check(&self, model: &str) -> BenchResult<()> {
        let invalid = |message: &str| BenchError::InvalidQuery {
            model: model.to_string(),
            message: message.to_string(),
        };
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(invalid("temperature must be a finite value >= 0"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be > 0"));
        }
        if self.messages.is_empty() {
            return Err(invalid("at least one message is required"));
        }
        Ok(())
    }
}

/// What a query returns: raw text, or a value that satisfied the schema
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Text(String),
    Structured(serde_json::Value),
}

/// Issues chat requests to whichever provider serves a model
#[derive(Clone)]
pub struct QueryClient {
    registry: Arc<ProviderRegistry>,
    providers: ProviderMap,
}

impl QueryClient {
    pub fn new(registry: Arc<ProviderRegistry>, providers: ProviderMap) -> Self {
        Self {
            registry,
            providers,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Send one request. No caching and no retries.
    pub async fn query(&self, model: &str, spec: &QuerySpec) -> BenchResult<QueryOutput> {
        let kind = self.registry.resolve_provider(model)?;
        spec.check(model)?;
        self.registry.connection_params(kind)?;

        let provider = self
            .providers
            .get(&kind)
            .ok_or_else(|| BenchError::UnsupportedProvider {
                provider: kind.to_string(),
            })?;

        let mut request = CompletionRequest::new(model, spec.messages.clone(), spec.max_tokens)
            .with_temperature(spec.temperature)
            .with_stop(spec.stop.clone());

        if let Some(schema) = &spec.response_schema {
            request.messages = with_schema_instruction(&request.messages, schema);
            request = request.with_response_format(JsonSchemaFormat {
                name: schema.name.clone(),
                schema: schema.to_json_schema(),
            });
        }

        let response = provider
            .complete(&request)
            .await
            .map_err(|source| BenchError::ProviderUnavailable {
                model: model.to_string(),
                provider: kind.to_string(),
                source,
            })?;

        tracing::debug!(
            "{} answered in {}ms ({} in / {} out tokens)",
            model,
            response.latency_ms,
            response.input_tokens,
            response.output_tokens
        );

        match &spec.response_schema {
            None => Ok(QueryOutput::Text(response.content)),
            Some(schema) => decode_value(&response.content, schema)
                .map(QueryOutput::Structured)
                .map_err(|detail| BenchError::SchemaViolation {
                    model: model.to_string(),
                    schema: schema.name.clone(),
                    detail,
                }),
        }
    }

    /// Query for free text; any response schema on `spec` is ignored
    pub async fn query_text(&self, model: &str, spec: &QuerySpec) -> BenchResult<String> {
        let mut spec = spec.clone();
        spec.response_schema = None;
        match self.query(model, &spec).await? {
            QueryOutput::Text(text) => Ok(text),
            QueryOutput::Structured(value) => Ok(value.to_string()),
        }
    }

    /// Query for a typed structured value, using the type's own schema
    pub async fn query_structured<T: StructuredOutput>(&self, model: &str, spec: &QuerySpec) -> BenchResult<T> {
        let schema = T::response_schema();
        let schema_name = schema.name.clone();
        let spec = spec.clone().with_schema(schema);

        let value = match self.query(model, &spec).await? {
            QueryOutput::Structured(value) => value,
            QueryOutput::Text(text) => serde_json::Value::String(text),
        };

        decode::<T>(value).map_err(|detail| BenchError::SchemaViolation {
            model: model.to_string(),
            schema: schema_name,
            detail,
        })
    }
}

/// Tell the model what shape to answer in, in addition to `response_format`
fn with_schema_instruction(messages: &[Message], schema: &ResponseSchema) -> Vec<Message> {
    let instruction = format!(
        "Respond only with a JSON object named {} that conforms to this JSON schema:\n{}",
        schema.name,
        schema.to_json_schema()
    );

    let mut messages = messages.to_vec();
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content = format!("{}\n\n{}", first.content, instruction);
        }
        _ => messages.insert(0, Message::system(instruction)),
    }
    messages
}
