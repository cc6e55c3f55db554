//! Pipeline configuration.
//!
//! Loaded from TOML, overridable from the CLI, validated eagerly before an
//! orchestrator is built.

use std::path::{Component, Path};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::generator::ProviderKind;
use crate::glob::PathMatcher;

/// Settings for one completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Endpoint override; the provider's public endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl ProviderSettings {
    fn primary() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }

    fn fast() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            base_url: None,
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    pub primary: ProviderSettings,
    pub fast: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderSettings::primary(),
            fast: ProviderSettings::fast(),
        }
    }
}

impl ProvidersConfig {
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Primary => &self.primary,
            ProviderKind::Fast => &self.fast,
        }
    }
}

/// Configuration for a pipeline orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Provider name: `primary` or `fast`. Checked when the generator is built.
    pub llm_provider: String,
    /// Minimum relevance score that requires a documentation update.
    pub relevance_threshold: f64,
    /// Paths that always require a documentation update when touched.
    pub always_document_paths: Vec<String>,
    /// Retries after the first attempt, for retryable errors only.
    pub max_retries: u32,
    /// Timeout applied to each attempt of load, generate and save.
    pub per_stage_timeout_secs: u64,
    /// Document the generator writes, relative to the store root.
    pub target_document: String,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub doc_relevant_paths: Vec<String>,
    pub public_interface_paths: Vec<String>,
    pub ignored_paths: Vec<String>,
    pub providers: ProvidersConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_provider: ProviderKind::Primary.as_str().to_string(),
            relevance_threshold: 0.5,
            always_document_paths: strings(&["api/**"]),
            max_retries: 3,
            per_stage_timeout_secs: 60,
            target_document: "docs/CHANGES.md".to_string(),
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            doc_relevant_paths: strings(&[
                "api/**",
                "src/**",
                "lib/**",
                "include/**",
                "pkg/**",
                "cmd/**",
                "docs/**",
                "*.md",
                "*.proto",
                "openapi.{yaml,yml,json}",
            ]),
            public_interface_paths: strings(&[
                "api/**",
                "include/**",
                "**/lib.rs",
                "**/mod.rs",
                "**/__init__.py",
                "**/index.{js,ts}",
                "*.proto",
                "*.graphql",
                "openapi.{yaml,yml,json}",
            ]),
            ignored_paths: strings(&[
                "tests/**",
                "**/tests/**",
                "test_*",
                "*_test.*",
                "*.lock",
                "package-lock.json",
                ".github/**",
            ]),
            providers: ProvidersConfig::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("config parse error: {e}")))
    }

    /// Read and parse a TOML file. Does not validate.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("config encode error: {e}")))
    }

    pub fn per_stage_timeout(&self) -> Duration {
        Duration::from_secs(self.per_stage_timeout_secs)
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfiguration(msg));

        if !self.relevance_threshold.is_finite() || !(0.0..=1.0).contains(&self.relevance_threshold)
        {
            return invalid(format!(
                "relevance_threshold must be within [0, 1], got {}",
                self.relevance_threshold
            ));
        }
        if self.per_stage_timeout_secs == 0 {
            return invalid("per_stage_timeout_secs must be greater than zero".into());
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return invalid(format!(
                "retry_max_delay_ms ({}) is below retry_base_delay_ms ({})",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            ));
        }
        validate_target(&self.target_document)?;

        for (name, patterns) in [
            ("always_document_paths", &self.always_document_paths),
            ("doc_relevant_paths", &self.doc_relevant_paths),
            ("public_interface_paths", &self.public_interface_paths),
            ("ignored_paths", &self.ignored_paths),
        ] {
            PathMatcher::new(patterns).map_err(|e| {
                PipelineError::InvalidConfiguration(format!("{name}: {e}"))
            })?;
        }

        for kind in ProviderKind::ALL {
            let settings = self.providers.settings(kind);
            if !settings.temperature.is_finite() || !(0.0..=2.0).contains(&settings.temperature) {
                return invalid(format!(
                    "providers.{kind}.temperature must be within [0, 2], got {}",
                    settings.temperature
                ));
            }
            if settings.model.trim().is_empty() {
                return invalid(format!("providers.{kind}.model must not be empty"));
            }
        }
        Ok(())
    }
}

fn validate_target(target: &str) -> Result<()> {
    let invalid = |why: &str| {
        Err(PipelineError::InvalidConfiguration(format!(
            "target_document '{target}' {why}"
        )))
    };
    if target.trim().is_empty() {
        return invalid("must not be empty");
    }
    let path = Path::new(target);
    if path.is_absolute() || target.starts_with('/') {
        return invalid("must be relative");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return invalid("must not escape the document root");
    }
    Ok(())
}
