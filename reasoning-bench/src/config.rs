//! Configuration management for the benchmark harness
//!
//! Loads provider, generation and scoring settings from TOML files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::analysis::MatchStrategy;
use crate::providers::{ConnectionParams, ProviderKind};
use crate::tasks::Variant;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL; falls back to the provider's built-in endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key; empty string means none
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// Tokens per minute
    #[serde(default = "default_tpm")]
    pub tpm: u32,
    /// Models served without a live catalog
    #[serde(default)]
    pub models: Vec<String>,
    /// Parameter counts in billions, overriding catalog values
    #[serde(default)]
    pub model_sizes: HashMap<String, f64>,
}

/// Item generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generator_model")]
    pub generator_model: String,
    #[serde(default = "default_generator_model")]
    pub validator_model: String,
    /// Generation attempts per item before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Answer scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Allowed word-set size difference for token-set matching
    #[serde(default = "default_tolerance")]
    pub tolerance: usize,
    #[serde(default = "default_lexical_threshold")]
    pub lexical_threshold: f64,
    #[serde(default = "default_subword_threshold")]
    pub subword_threshold: f64,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_endpoint")]
    pub embedding_endpoint: String,
    /// Model asked to judge answers under the `judge` strategy
    #[serde(default)]
    pub judge_model: Option<String>,
    /// Per-variant strategy overrides. Unknown variant names fail to parse.
    #[serde(default)]
    pub strategies: BTreeMap<Variant, MatchStrategy>,
}

/// Benchmark execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// (test, model) evaluations run at once
    #[serde(default = "default_parallel_requests")]
    pub parallel_requests: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_tokens")]
    pub answer_max_tokens: u32,
    #[serde(default)]
    pub answer_temperature: f32,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_rpm() -> u32 { 60 }
fn default_tpm() -> u32 { 100_000 }
fn default_generator_model() -> String { "gpt-4-1106-preview".to_string() }
fn default_max_attempts() -> u32 { 3 }
fn default_generation_temperature() -> f32 { 1.0 }
fn default_max_tokens() -> u32 { 2000 }
fn default_tolerance() -> usize { 2 }
fn default_lexical_threshold() -> f64 { 0.8 }
fn default_subword_threshold() -> f64 { 0.9 }
fn default_semantic_threshold() -> f64 { 0.85 }
fn default_embedding_model() -> String { "TaylorAI/gte-tiny".to_string() }
fn default_embedding_endpoint() -> String { "http://localhost:1234/v1".to_string() }
fn default_parallel_requests() -> usize { 3 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_output_dir() -> String { "results".to_string() }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generator_model: default_generator_model(),
            validator_model: default_generator_model(),
            max_attempts: default_max_attempts(),
            temperature: default_generation_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            lexical_threshold: default_lexical_threshold(),
            subword_threshold: default_subword_threshold(),
            semantic_threshold: default_semantic_threshold(),
            embedding_model: default_embedding_model(),
            embedding_endpoint: default_embedding_endpoint(),
            judge_model: None,
            strategies: BTreeMap::new(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            parallel_requests: default_parallel_requests(),
            timeout_ms: default_timeout_ms(),
            answer_max_tokens: default_max_tokens(),
            answer_temperature: 0.0,
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/bench.toml",
            "../config/bench.toml",
            "reasoning-bench/config/bench.toml",
        ];

        for path in &config_paths {
            if let Ok(config) = Self::from_file(path) {
                tracing::info!("Loaded configuration from {}", path);
                return config;
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Get a specific provider config
    pub fn get_provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(kind.as_str())
    }
}

impl ProviderConfig {
    /// Connection params for this provider, config values over built-ins
    pub fn connection_params(&self, kind: ProviderKind) -> ConnectionParams {
        let mut params = kind.default_connection();
        if let Some(endpoint) = &self.endpoint {
            params.endpoint = endpoint.clone();
        }
        if let Some(env) = &self.api_key_env {
            params.credential.env_var = (!env.is_empty()).then(|| env.clone());
        }
        params
    }

    fn with_models(models: &[&str], sizes: &[(&str, f64)]) -> Self {
        Self {
            enabled: true,
            endpoint: None,
            api_key_env: None,
            rpm: default_rpm(),
            tpm: default_tpm(),
            models: models.iter().map(|m| m.to_string()).collect(),
            model_sizes: sizes.iter().map(|(m, s)| (m.to_string(), *s)).collect(),
        }
    }
}

impl ScoringConfig {
    /// Matching strategy for a variant: explicit override, else the variant default
    pub fn strategy_for(&self, variant: Variant) -> MatchStrategy {
        self.strategies
            .get(&variant)
            .cloned()
            .unwrap_or_else(|| MatchStrategy::default_for(variant, self))
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();

        let mut openai = ProviderConfig::with_models(
            &["gpt-3.5-turbo-1106", "gpt-4-1106-preview"],
            &[("gpt-3.5-turbo-1106", 170.0), ("gpt-4-1106-preview", 400.0)],
        );
        openai.rpm = 500;
        openai.tpm = 200_000;
        providers.insert("openai".to_string(), openai);

        // Together models arrive through the live catalog
        providers.insert("together".to_string(), ProviderConfig::with_models(&[], &[]));

        providers.insert(
            "local".to_string(),
            ProviderConfig::with_models(
                &[
                    "phi-2",
                    "una-cybertron-7b-v2-bf16",
                    "openhermes-2.5-neural-chat-7b-v3-1-7b",
                ],
                &[("una-cybertron-7b-v2-bf16", 7.0)],
            ),
        );

        Self {
            providers,
            generation: GenerationConfig::default(),
            scoring: ScoringConfig::default(),
            benchmark: BenchmarkConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.contains_key("openai"));
        assert!(config.providers.contains_key("together"));
        assert!(config.providers.contains_key("local"));
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.scoring.tolerance, 2);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[providers.local]
endpoint = "http://127.0.0.1:8080/v1"
models = ["phi-2"]

[providers.local.model_sizes]
phi-2 = 2.7

[generation]
generator_model = "phi-2"
max_attempts = 5

[scoring.strategies.spatial_reasoning]
type = "lexical"
threshold = 0.75
"#;
        let config = Config::from_toml(toml).unwrap();
        let local = config.get_provider(ProviderKind::Local).unwrap();
        assert_eq!(local.models, vec!["phi-2".to_string()]);
        assert_eq!(local.model_sizes["phi-2"], 2.7);
        assert_eq!(config.generation.max_attempts, 5);
        assert_eq!(config.generation.validator_model, "gpt-4-1106-preview");
        assert_eq!(
            config.scoring.strategy_for(Variant::SpatialReasoning),
            MatchStrategy::Lexical { threshold: 0.75 }
        );
    }

    #[test]
    fn test_unknown_strategy_variant_is_rejected() {
        let misspelled = "[scoring.strategies.spatial]\ntype = \"judge\"\n";
        assert!(matches!(Config::from_toml(misspelled), Err(ConfigError::Parse(_))));

        let config = Config::from_toml("[scoring.strategies.spatial_reasoning]\ntype = \"judge\"\n").unwrap();
        assert_eq!(config.scoring.strategy_for(Variant::SpatialReasoning), MatchStrategy::Judge);
    }

    #[test]
    fn test_connection_params_override() {
        let mut pc = ProviderConfig::with_models(&[], &[]);
        pc.endpoint = Some("http://gpu-box:1234/v1".to_string());
        pc.api_key_env = Some(String::new());

        let params = pc.connection_params(ProviderKind::Together);
        assert_eq!(params.endpoint, "http://gpu-box:1234/v1");
        assert!(!params.credential.is_required());

        let defaults = ProviderConfig::with_models(&[], &[]).connection_params(ProviderKind::Together);
        assert_eq!(defaults.credential.env_var.as_deref(), Some("TOGETHER_API_KEY"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        let mut config = Config::default();
        config
            .scoring
            .strategies
            .insert(Variant::ContextualDissonance, MatchStrategy::Judge);
        config.save_toml(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.providers.len(), 3);
        assert_eq!(reloaded.scoring.strategy_for(Variant::ContextualDissonance), MatchStrategy::Judge);
        assert_eq!(reloaded.scoring.embedding_model, "TaylorAI/gte-tiny");
    }
}
