//! Model-to-provider registry
//!
//! Built once at startup from the static model lists in config plus an
//! optional catalog handed over by the (external) catalog fetcher, then shared
//! read-only by every component that issues queries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{ConnectionParams, ProviderKind};
use crate::config::Config;
use crate::error::{BenchError, BenchResult};

/// A model entry as delivered by the catalog fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModel {
    pub id: String,
    /// Approximate parameter count in billions, when the provider reports it
    #[serde(default)]
    pub size_billions: Option<f64>,
}

/// Provider name -> available models, as fetched from hosted APIs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(flatten)]
    pub providers: HashMap<String, Vec<CatalogModel>>,
}

impl ModelCatalog {
    /// Load a catalog snapshot written by the fetcher
    pub fn from_file(path: impl AsRef<Path>) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Registry entry for one model
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredModel {
    pub provider: ProviderKind,
    pub size_billions: Option<f64>,
}

/// Immutable mapping from model identifier to provider and connection params
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    models: IndexMap<String, RegisteredModel>,
    connections: HashMap<ProviderKind, ConnectionParams>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build the registry from config and an optional live catalog.
    ///
    /// Disabled providers get no connection params; their models stay
    /// registered so lookups fail with `UnsupportedProvider` rather than
    /// `UnknownModel`.
    pub fn from_config(config: &Config, catalog: Option<&ModelCatalog>) -> BenchResult<Self> {
        let mut builder = Self::builder();

        for (name, pc) in &config.providers {
            let kind: ProviderKind = name.parse()?;
            if pc.enabled {
                builder = builder.connection(kind, pc.connection_params(kind));
            }
            for model in &pc.models {
                builder = builder.model(model, kind, pc.model_sizes.get(model).copied())?;
            }
        }

        if let Some(catalog) = catalog {
            for (name, models) in &catalog.providers {
                let kind: ProviderKind = name.parse()?;
                for model in models {
                    let size = config
                        .get_provider(kind)
                        .and_then(|pc| pc.model_sizes.get(&model.id).copied())
                        .or(model.size_billions);
                    builder = builder.model(&model.id, kind, size)?;
                }
            }
        }

        let registry = builder.build();
        tracing::info!(
            "Registered {} models across {} providers",
            registry.models.len(),
            registry.connections.len()
        );
        Ok(registry)
    }

    /// Which provider serves this model
    pub fn resolve_provider(&self, model: &str) -> BenchResult<ProviderKind> {
        self.models
            .get(model)
            .map(|m| m.provider)
            .ok_or_else(|| BenchError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// How to reach a provider
    pub fn connection_params(&self, provider: ProviderKind) -> BenchResult<&ConnectionParams> {
        self.connections
            .get(&provider)
            .ok_or_else(|| BenchError::UnsupportedProvider {
                provider: provider.to_string(),
            })
    }

    /// Parameter-count size in billions, used by reporting only
    pub fn model_size(&self, model: &str) -> Option<f64> {
        self.models.get(model).and_then(|m| m.size_billions)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// All registered models in registration order
    pub fn models(&self) -> impl Iterator<Item = (&str, &RegisteredModel)> {
        self.models.iter().map(|(id, m)| (id.as_str(), m))
    }

    pub fn models_for(&self, provider: ProviderKind) -> Vec<&str> {
        self.models
            .iter()
            .filter(|(_, m)| m.provider == provider)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Providers with connection params, in a stable order
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.connections.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Model sizes keyed by model id, for the plotting collaborator
    pub fn model_sizes(&self) -> HashMap<String, f64> {
        self.models
            .iter()
            .filter_map(|(id, m)| m.size_billions.map(|s| (id.clone(), s)))
            .collect()
    }
}

/// Incremental construction; the finished registry is immutable
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: IndexMap<String, RegisteredModel>,
    connections: HashMap<ProviderKind, ConnectionParams>,
}

impl RegistryBuilder {
    pub fn connection(mut self, provider: ProviderKind, params: ConnectionParams) -> Self {
        self.connections.insert(provider, params);
        self
    }

    /// Register a model. Re-registering under the same provider refreshes its
    /// size; registering under a different provider is an error.
    pub fn model(
        mut self,
        id: impl Into<String>,
        provider: ProviderKind,
        size_billions: Option<f64>,
    ) -> BenchResult<Self> {
        let id = id.into();
        match self.models.get_mut(&id) {
            Some(existing) if existing.provider != provider => {
                return Err(BenchError::DuplicateModel {
                    model: id,
                    first: existing.provider.to_string(),
                    second: provider.to_string(),
                });
            }
            Some(existing) => {
                if size_billions.is_some() {
                    existing.size_billions = size_billions;
                }
            }
            None => {
                self.models.insert(
                    id,
                    RegisteredModel {
                        provider,
                        size_billions,
                    },
                );
            }
        }
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            models: self.models,
            connections: self.connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builder()
            .connection(ProviderKind::Local, ProviderKind::Local.default_connection())
            .model("phi-2", ProviderKind::Local, Some(2.7))
            .unwrap()
            .model("gpt-4-1106-preview", ProviderKind::OpenAI, Some(400.0))
            .unwrap()
            .build()
    }

    #[test]
    fn test_resolve_known_model() {
        let reg = registry();
        assert_eq!(reg.resolve_provider("phi-2").unwrap(), ProviderKind::Local);
        assert_eq!(reg.model_size("gpt-4-1106-preview"), Some(400.0));
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = registry().resolve_provider("mystery-7b").unwrap_err();
        assert!(matches!(err, BenchError::UnknownModel { ref model } if model == "mystery-7b"));
    }

    #[test]
    fn test_unconfigured_provider_is_unsupported() {
        let reg = registry();
        assert!(reg.connection_params(ProviderKind::Local).is_ok());
        assert!(matches!(
            reg.connection_params(ProviderKind::OpenAI),
            Err(BenchError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_model_maps_to_exactly_one_provider() {
        let result = ProviderRegistry::builder()
            .model("mixtral", ProviderKind::Together, None)
            .unwrap()
            .model("mixtral", ProviderKind::Local, None);
        assert!(matches!(result, Err(BenchError::DuplicateModel { .. })));
    }

    #[test]
    fn test_catalog_parse() {
        let json = r#"{
            "together": [
                {"id": "mistralai/Mixtral-8x7B-Instruct-v0.1", "size_billions": 46.7},
                {"id": "qwen/qwen-7b-chat"}
            ]
        }"#;
        let catalog: ModelCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.providers["together"].len(), 2);
        assert_eq!(catalog.providers["together"][1].size_billions, None);
    }

    #[test]
    fn test_from_config_merges_catalog() {
        let config = Config::default();
        let mut catalog = ModelCatalog::default();
        catalog.providers.insert(
            "together".to_string(),
            vec![CatalogModel {
                id: "mistral-7b-instruct-v0.2".to_string(),
                size_billions: Some(7.2),
            }],
        );

        let reg = ProviderRegistry::from_config(&config, Some(&catalog)).unwrap();
        assert_eq!(
            reg.resolve_provider("mistral-7b-instruct-v0.2").unwrap(),
            ProviderKind::Together
        );
        assert_eq!(reg.resolve_provider("phi-2").unwrap(), ProviderKind::Local);
        assert_eq!(reg.model_size("gpt-3.5-turbo-1106"), Some(170.0));
    }

    #[test]
    fn test_catalog_with_unknown_provider() {
        let mut catalog = ModelCatalog::default();
        catalog.providers.insert("replicate".to_string(), vec![]);
        let err = ProviderRegistry::from_config(&Config::default(), Some(&catalog)).unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedProvider { .. }));
    }
}
