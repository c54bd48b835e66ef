// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod adapter;
pub mod catalog;
pub mod http_adapter;
pub mod mock;
pub mod types;

pub use adapter::{AgentAdapter, Unsubscribe};
pub use catalog::ModelCatalogEntry;
pub use http_adapter::HttpAgentAdapter;
pub use mock::{MockAdapter, ScriptedMockAdapter};
pub use types::*;

use ads_config::ModelConfig;
use anyhow::bail;

/// Construct a boxed [`AgentAdapter`] for `agent_id` from configuration.
///
/// `provider = "mock"` builds an in-process [`MockAdapter`]; every other
/// value builds an [`HttpAgentAdapter`] against `base_url` (default
/// `https://api.openai.com/v1`), since every hosted or self-hosted backend
/// this runtime talks to speaks the same chat-completions wire format.
pub fn from_config(agent_id: &str, cfg: &ModelConfig) -> anyhow::Result<Box<dyn AgentAdapter>> {
    match cfg.provider.as_str() {
        "mock" => Ok(Box::new(MockAdapter::new(agent_id))),
        "http" | "" => Ok(Box::new(HttpAgentAdapter::new(agent_id, cfg))),
        other => bail!("unknown agent provider: {other:?} (expected \"http\" or \"mock\")"),
    }
}

/// Resolve a [`ModelConfig`] for `override_str`, checking `config.providers`
/// for named custom configs first, falling back to overriding
/// `config.model`'s fields in place.
///
/// `override_str` forms:
/// - a key in `config.providers` (optionally `key/model` to also override the
///   model name)
/// - a bare model name, which replaces `config.model.name`
pub fn resolve_model_from_config(config: &ads_config::Config, override_str: &str) -> ModelConfig {
    let (key, model_suffix) = match override_str.split_once('/') {
        Some((k, m)) => (k, Some(m)),
        None => (override_str, None),
    };

    if let Some(named) = config.providers.get(key) {
        let mut cfg = named.clone();
        if let Some(model) = model_suffix {
            cfg.name = model.to_string();
        }
        return cfg;
    }

    let mut cfg = config.model.clone();
    cfg.name = override_str.to_string();
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(provider: &str, model: &str) -> ModelConfig {
        ModelConfig { provider: provider.into(), name: model.into(), ..ModelConfig::default() }
    }

    #[test]
    fn from_config_mock_succeeds() {
        let cfg = minimal_config("mock", "mock-model");
        assert!(from_config("a1", &cfg).is_ok());
    }

    #[test]
    fn from_config_http_succeeds() {
        let cfg = minimal_config("http", "gpt-4o");
        assert!(from_config("a1", &cfg).is_ok());
    }

    #[test]
    fn from_config_unknown_provider_errors() {
        let cfg = minimal_config("totally-unknown-xyz", "m");
        let err = from_config("a1", &cfg).err().unwrap().to_string();
        assert!(err.contains("unknown agent provider"));
    }

    #[test]
    fn resolve_from_config_named_provider_used_as_base() {
        use std::collections::HashMap;
        let mut providers = HashMap::new();
        providers.insert(
            "my_ollama".into(),
            ModelConfig {
                provider: "http".into(),
                base_url: Some("http://localhost:11434/v1".into()),
                name: "llama3.2".into(),
                ..ModelConfig::default()
            },
        );
        let config = ads_config::Config { providers, ..ads_config::Config::default() };
        let cfg = resolve_model_from_config(&config, "my_ollama");
        assert_eq!(cfg.name, "llama3.2");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn resolve_from_config_named_provider_with_model_override() {
        use std::collections::HashMap;
        let mut providers = HashMap::new();
        providers.insert(
            "my_ollama".into(),
            ModelConfig {
                provider: "http".into(),
                base_url: Some("http://localhost:11434/v1".into()),
                name: "llama3.2".into(),
                ..ModelConfig::default()
            },
        );
        let config = ads_config::Config { providers, ..ads_config::Config::default() };
        let cfg = resolve_model_from_config(&config, "my_ollama/codellama");
        assert_eq!(cfg.name, "codellama");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn resolve_bare_model_name_overrides_config_model() {
        let config = ads_config::Config {
            model: minimal_config("http", "gpt-4o"),
            ..ads_config::Config::default()
        };
        let cfg = resolve_model_from_config(&config, "gpt-4o-mini");
        assert_eq!(cfg.name, "gpt-4o-mini");
        assert_eq!(cfg.provider, "http");
    }
}
