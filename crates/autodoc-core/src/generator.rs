//! Document generation over a text-completion provider.
//!
//! The provider is resolved once, when the [`DocumentGenerator`] is built.
//! Unknown or unregistered names fail with
//! [`PipelineError::UnsupportedProvider`] before any transport is touched,
//! and provider failures are surfaced as [`PipelineError::GenerationError`]
//! without retrying.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autodoc_state::ContentDigest;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::domain::{ChangeSignal, DraftDocument, TargetDocument};
use crate::error::{PipelineError, ProviderError, Result};

/// The closed set of provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// High-quality general-purpose model.
    Primary,
    /// Fast, cheap model.
    Fast,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Primary, ProviderKind::Fast];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Fast => "fast",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call completion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for one provider call.
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn for_provider(config: &PipelineConfig, kind: ProviderKind) -> Self {
        let settings = config.providers.settings(kind);
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: config.per_stage_timeout(),
        }
    }
}

/// Text-completion capability implemented by each provider variant.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderError>;
}

/// Providers available for selection, at most one per kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn CompletionProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds.into_iter().map(|k| k.as_str()).collect()
    }

    /// Resolve a configured name. No fallback to another provider.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CompletionProvider>> {
        ProviderKind::from_name(name)
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| PipelineError::UnsupportedProvider {
                name: name.to_string(),
                registered: self.names().join(", "),
            })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// Completions keyed by signal digest and target path.
///
/// Never returns a completion made for a different target document.
#[derive(Debug, Default)]
pub struct CompletionCache {
    entries: Mutex<HashMap<(ContentDigest, String), String>>,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal: &ContentDigest, target_path: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&(signal.clone(), target_path.to_string()))
            .cloned()
    }

    pub fn insert(&self, signal: ContentDigest, target_path: &str, content: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((signal, target_path.to_string()), content);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces a [`DraftDocument`] from a signal and the current target document.
#[derive(Clone)]
pub struct DocumentGenerator {
    provider: Arc<dyn CompletionProvider>,
    kind: ProviderKind,
    options: CompletionOptions,
    cache: Option<Arc<CompletionCache>>,
}

impl std::fmt::Debug for DocumentGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentGenerator")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl DocumentGenerator {
    /// Select `config.llm_provider` from `registry`.
    pub fn from_config(config: &PipelineConfig, registry: &ProviderRegistry) -> Result<Self> {
        let provider = registry.resolve(&config.llm_provider)?;
        let kind = provider.kind();
        Ok(Self {
            options: CompletionOptions::for_provider(config, kind),
            provider,
            kind,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<CompletionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    pub async fn generate(
        &self,
        signal: &ChangeSignal,
        target: &TargetDocument,
    ) -> Result<DraftDocument> {
        let digest = signal.digest();
        if let Some(content) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(&digest, &target.path))
        {
            debug!(target_path = %target.path, signal = digest.short(), "completion cache hit");
            return Ok(self.draft(target, content));
        }

        let prompt = build_prompt(signal, target);
        let content = self
            .provider
            .complete(&prompt, &self.options)
            .await
            .map_err(|e| PipelineError::generation(self.kind.as_str(), e))?;

        if content.trim().is_empty() {
            return Err(PipelineError::generation(
                self.kind.as_str(),
                ProviderError::EmptyResponse,
            ));
        }

        if let Some(cache) = &self.cache {
            cache.insert(digest, &target.path, content.clone());
        }
        Ok(self.draft(target, content))
    }

    fn draft(&self, target: &TargetDocument, content: String) -> DraftDocument {
        DraftDocument {
            target_path: target.path.clone(),
            content,
            provider: self.kind,
            generated_at: Utc::now(),
            base_revision: target.base_revision.clone(),
        }
    }
}

/// Prompt for a full replacement of the target document.
pub fn build_prompt(signal: &ChangeSignal, target: &TargetDocument) -> String {
    let mut prompt = format!(
        "You maintain the documentation file `{}`.\n\
         Update it to reflect the code change described below.\n\n\
         Change summary: {}\n",
        target.path, signal.summary
    );
    if !signal.topics.is_empty() {
        let topics: Vec<&str> = signal.topics.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Affected topics: {}\n", topics.join(", ")));
    }
    if !signal.always_document_hits.is_empty() {
        prompt.push_str(&format!(
            "Always-documented paths touched: {}\n",
            signal.always_document_hits.join(", ")
        ));
    }
    prompt.push_str("Changed files:\n");
    for path in &signal.changed_paths {
        prompt.push_str(&format!("- {path}\n"));
    }
    prompt.push_str("\nCurrent document:\n");
    match &target.existing_content {
        Some(existing) if !existing.trim().is_empty() => {
            prompt.push_str(existing);
            prompt.push('\n');
        }
        _ => prompt.push_str("(the document does not exist yet)\n"),
    }
    prompt.push_str(
        "\nReturn the complete updated document as Markdown, without any commentary.",
    );
    prompt
}
