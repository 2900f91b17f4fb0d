//! Self-validating reasoning benchmarks for LLMs
//!
//! This crate generates puzzle-style test items with one model, has a
//! (possibly different) model check them, then puts the accepted items to the
//! models under test and scores their answers.
//!
//! # Features
//!
//! - Hosted (OpenAI, Together) and local OpenAI-compatible providers behind
//!   one model-to-provider registry
//! - Schema-typed structured queries with strict decoding
//! - Generate-then-validate item generation with bounded retries
//! - Token-set, TF-IDF, character n-gram, embedding, ordered-symbol and
//!   model-judge answer matching
//! - Per-test accuracy with a 95% Wald interval
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reasoning_bench::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let registry = Arc::new(ProviderRegistry::from_config(&config, None)?);
//!     let providers = create_providers(&registry, &config)?;
//!     let client = QueryClient::new(registry, providers);
//!
//!     // Generate a small puzzle set
//!     let generator = ItemGenerator::new(client.clone(), &config.generation);
//!     let set = generator.generate_set(Variant::SequenceLogicPuzzle, 5).await?;
//!
//!     // Evaluate one model on it
//!     let scorer = AnswerScorer::new(config.scoring.clone());
//!     let executor = Executor::new(client, scorer, ExecutorConfig::from(&config.benchmark));
//!     let score = executor.evaluate(&set, "phi-2").await?;
//!
//!     let scores = ScoreCollection::new().record_score(score);
//!     println!("{} records", scores.len());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod generation;
pub mod providers;
pub mod query;
pub mod reporting;
pub mod results;
pub mod runner;
pub mod tasks;

pub use config::Config;
pub use error::{BenchError, BenchResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{AnswerScorer, ConfidenceInterval, Embedder, HttpEmbedder, MatchStrategy};
    pub use crate::config::Config;
    pub use crate::error::{BenchError, BenchResult};
    pub use crate::generation::ItemGenerator;
    pub use crate::providers::{
        create_providers, CompletionRequest, CompletionResponse, LLMProvider, Message,
        ProviderError, ProviderKind, ProviderRegistry, ProviderResult,
    };
    pub use crate::query::{QueryClient, QuerySpec, ResponseSchema, StructuredOutput};
    pub use crate::reporting::{print_console_report, ScoreTable};
    pub use crate::results::{ScoreCollection, TestScore};
    pub use crate::runner::{Executor, ExecutorConfig};
    pub use crate::tasks::{ItemSet, TestItem, Variant};
}
