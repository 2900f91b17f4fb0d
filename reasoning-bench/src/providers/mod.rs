//! Provider backends and the model-to-provider registry

pub mod mock;
pub mod openai;
pub mod registry;
pub mod traits;

pub use mock::ScriptedProvider;
pub use openai::OpenAICompatClient;
pub use registry::{CatalogModel, ModelCatalog, ProviderRegistry, RegisteredModel, RegistryBuilder};
pub use traits::{
    CompletionRequest, CompletionResponse, JsonSchemaFormat, LLMProvider, Message,
    ProviderError, ProviderResult, Role,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BenchError, BenchResult};

/// The closed set of backends that can serve a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Commercial hosted API (OpenAI)
    OpenAI,
    /// Third-party hosted open models (Together)
    Together,
    /// Local inference server speaking the OpenAI protocol
    Local,
}

impl ProviderKind {
    pub fn all() -> Vec<ProviderKind> {
        vec![ProviderKind::OpenAI, ProviderKind::Together, ProviderKind::Local]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Together => "together",
            ProviderKind::Local => "local",
        }
    }

    /// Built-in connection parameters, overridable from config
    pub fn default_connection(&self) -> ConnectionParams {
        match self {
            ProviderKind::OpenAI => {
                ConnectionParams::new("https://api.openai.com/v1", Some("OPENAI_API_KEY"))
            }
            ProviderKind::Together => {
                ConnectionParams::new("https://api.together.xyz/v1", Some("TOGETHER_API_KEY"))
            }
            ProviderKind::Local => ConnectionParams::new("http://localhost:1234/v1", None),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "together" | "togetherai" => Ok(ProviderKind::Together),
            "local" => Ok(ProviderKind::Local),
            _ => Err(BenchError::UnsupportedProvider {
                provider: s.to_string(),
            }),
        }
    }
}

/// Where a provider lives and which environment variable holds its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub endpoint: String,
    pub credential: CredentialRef,
}

impl ConnectionParams {
    pub fn new(endpoint: impl Into<String>, api_key_env: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: CredentialRef {
                env_var: api_key_env.map(str::to_string),
            },
        }
    }
}

/// Reference to a credential; the secret itself is only read on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub env_var: Option<String>,
}

impl CredentialRef {
    /// Whether this provider needs a key at all
    pub fn is_required(&self) -> bool {
        self.env_var.is_some()
    }

    /// Read the credential from the environment
    pub fn resolve(&self) -> Option<Credential> {
        let var = self.env_var.as_ref()?;
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Credential)
    }
}

/// An opaque API key. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Provider clients keyed by kind, shared by every query
pub type ProviderMap = HashMap<ProviderKind, Arc<dyn LLMProvider>>;

/// Create one OpenAI-compatible client per provider the registry knows how to reach
pub fn create_providers(registry: &ProviderRegistry, config: &Config) -> BenchResult<ProviderMap> {
    let timeout = Duration::from_millis(config.benchmark.timeout_ms);
    let mut providers: ProviderMap = HashMap::new();

    for kind in registry.configured_providers() {
        let params = registry.connection_params(kind)?;
        let mut client = OpenAICompatClient::new(kind, params, timeout)
            .map_err(|e| BenchError::ProviderUnavailable {
                model: "*".to_string(),
                provider: kind.to_string(),
                source: e,
            })?;
        if let Some(pc) = config.get_provider(kind) {
            client = client.with_rate_limits(pc.rpm, pc.tpm);
        }
        tracing::debug!("Configured {} provider at {}", kind, params.endpoint);
        providers.insert(kind, Arc::new(client));
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("together".parse::<ProviderKind>().unwrap(), ProviderKind::Together);
        assert!(matches!(
            "anthropic".parse::<ProviderKind>(),
            Err(BenchError::UnsupportedProvider { provider }) if provider == "anthropic"
        ));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("sk-secret");
        assert_eq!(format!("{:?}", cred), "Credential(***)");
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let params = ProviderKind::Local.default_connection();
        assert!(!params.credential.is_required());
        assert!(params.credential.resolve().is_none());
    }
}
