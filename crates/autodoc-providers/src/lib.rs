//! Network-backed implementations of the autodoc capabilities.
//!
//! - [`GitHubDiffSource`]: fetches commit and pull request diffs from the
//!   GitHub REST API.
//! - [`OpenAiProvider`]: the `primary` completion provider (chat completions).
//! - [`GeminiProvider`]: the `fast` completion provider (`generateContent`).
//!
//! [`registry_from_config`] wires both providers from a [`PipelineConfig`].

pub mod gemini;
pub mod github;
mod http;
pub mod openai;

use std::sync::Arc;

use autodoc_core::{PipelineConfig, PipelineError, ProviderKind, ProviderRegistry, Result};

pub use gemini::GeminiProvider;
pub use github::GitHubDiffSource;
pub use openai::OpenAiProvider;

/// Build a registry holding every provider kind, keyed from the environment.
///
/// Providers whose key variable is unset are still registered and fail on
/// first use, except the selected one: a missing key for
/// `config.llm_provider` is reported here as `InvalidConfiguration`.
pub fn registry_from_config(config: &PipelineConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for kind in ProviderKind::ALL {
        let settings = config.providers.settings(kind);
        let api_key = read_key(&settings.api_key_env);

        if ProviderKind::from_name(&config.llm_provider) == Some(kind) && api_key.is_none() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "provider '{kind}' needs an API key in ${}",
                settings.api_key_env
            )));
        }

        match kind {
            ProviderKind::Primary => {
                registry.register(Arc::new(OpenAiProvider::new(settings, api_key)?))
            }
            ProviderKind::Fast => {
                registry.register(Arc::new(GeminiProvider::new(settings, api_key)?))
            }
        }
    }
    Ok(registry)
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_for_selected_provider_is_a_config_error() {
        let mut config = PipelineConfig::default();
        config.providers.primary.api_key_env = "AUTODOC_TEST_UNSET_PRIMARY_KEY".into();
        let err = registry_from_config(&config).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(m) if m.contains("AUTODOC_TEST_UNSET_PRIMARY_KEY")));
    }

    #[test]
    fn unknown_provider_name_defers_to_generator() {
        let mut config = PipelineConfig::default();
        config.llm_provider = "gpt-4".into();
        config.providers.primary.api_key_env = "AUTODOC_TEST_UNSET_PRIMARY_KEY".into();
        config.providers.fast.api_key_env = "AUTODOC_TEST_UNSET_FAST_KEY".into();

        let registry = registry_from_config(&config).unwrap();
        assert_eq!(registry.names(), vec!["fast", "primary"]);
        assert!(registry.resolve("gpt-4").is_err());
    }
}
