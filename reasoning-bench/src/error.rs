//! Error taxonomy shared by the query, generation and scoring layers

use crate::providers::ProviderError;
use crate::tasks::Variant;

/// Errors surfaced by the benchmark core.
///
/// Every variant carries enough context (model, test, schema) to reproduce
/// the failing call. None of them is ever turned into a placeholder score.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("unknown model: {model}")]
    UnknownModel { model: String },

    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("provider {provider} unavailable for model {model}: {source}")]
    ProviderUnavailable {
        model: String,
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("model {model} violated schema '{schema}': {detail}")]
    SchemaViolation {
        model: String,
        schema: String,
        detail: String,
    },

    #[error("could not generate a valid {variant} item after {attempts} attempts (last: {last_reason})")]
    ItemGenerationExhausted {
        variant: Variant,
        attempts: u32,
        last_reason: String,
    },

    #[error("test {test} has no questions for model {model}")]
    EmptyQuestionSet { test: Variant, model: String },

    #[error("embedding model {model} unavailable: {message}")]
    EmbeddingModelUnavailable { model: String, message: String },

    #[error("invalid query for model {model}: {message}")]
    InvalidQuery { model: String, message: String },

    #[error("evaluation of {model} aborted: {message}")]
    EvaluationAborted { model: String, message: String },

    #[error("model {model} registered for both {first} and {second}")]
    DuplicateModel {
        model: String,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;

impl BenchError {
    /// Name of the model involved, if the error concerns one
    pub fn model(&self) -> Option<&str> {
        match self {
            BenchError::UnknownModel { model }
            | BenchError::ProviderUnavailable { model, .. }
            | BenchError::SchemaViolation { model, .. }
            | BenchError::EmptyQuestionSet { model, .. }
            | BenchError::EmbeddingModelUnavailable { model, .. }
            | BenchError::InvalidQuery { model, .. }
            | BenchError::EvaluationAborted { model, .. }
            | BenchError::DuplicateModel { model, .. } => Some(model),
            _ => None,
        }
    }
}
