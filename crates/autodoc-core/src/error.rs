//! Pipeline error taxonomy.

use autodoc_state::StorageError;
use serde::{Deserialize, Serialize};

/// Failure reported by a text-completion provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("provider quota exhausted: {0}")]
    Quota(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider transport failure: {0}")]
    Transport(String),

    #[error("provider returned an empty completion")]
    EmptyResponse,
}

/// Errors surfaced by pipeline stages to the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("transient fetch error: {0}")]
    TransientFetchError(String),

    #[error("unsupported provider '{name}' (registered: {registered})")]
    UnsupportedProvider { name: String, registered: String },

    #[error("generation failed via provider '{provider}'")]
    GenerationError {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("persist conflict on {target}: {detail}")]
    PersistConflict { target: String, detail: String },

    #[error("persist unavailable: {0}")]
    PersistUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Flat, serializable error kind for reports and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    TransientFetchError,
    UnsupportedProvider,
    GenerationError,
    PersistConflict,
    PersistUnavailable,
    InvalidConfiguration,
    InvalidTransition,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            PipelineError::TransientFetchError(_) => ErrorKind::TransientFetchError,
            PipelineError::UnsupportedProvider { .. } => ErrorKind::UnsupportedProvider,
            PipelineError::GenerationError { .. } => ErrorKind::GenerationError,
            PipelineError::PersistConflict { .. } => ErrorKind::PersistConflict,
            PipelineError::PersistUnavailable(_) => ErrorKind::PersistUnavailable,
            PipelineError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            PipelineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    /// Only transport-level fetch and persist failures may be re-attempted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientFetchError(_) | PipelineError::PersistUnavailable(_)
        )
    }

    /// Messages of this error and every `source()` beneath it, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }

    pub(crate) fn generation(provider: impl Into<String>, source: ProviderError) -> Self {
        PipelineError::GenerationError {
            provider: provider.into(),
            source,
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict {
                path,
                expected,
                actual,
            } => PipelineError::PersistConflict {
                target: path,
                detail: format!("expected revision {expected}, found {actual}"),
            },
            StorageError::InvalidPath { path } => {
                PipelineError::InvalidConfiguration(format!("invalid target document path: {path}"))
            }
            other => PipelineError::PersistUnavailable(other.to_string()),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(PipelineError::TransientFetchError("reset".into()).is_retryable());
        assert!(PipelineError::PersistUnavailable("down".into()).is_retryable());

        assert!(!PipelineError::SourceUnavailable("404".into()).is_retryable());
        assert!(!PipelineError::generation("primary", ProviderError::Quota("429".into()))
            .is_retryable());
        assert!(!PipelineError::PersistConflict {
            target: "docs/a.md".into(),
            detail: "moved".into()
        }
        .is_retryable());
        assert!(!PipelineError::InvalidConfiguration("x".into()).is_retryable());
        assert!(!PipelineError::UnsupportedProvider {
            name: "x".into(),
            registered: "primary".into()
        }
        .is_retryable());
    }

    #[test]
    fn generation_error_chain_includes_provider_cause() {
        let err = PipelineError::generation("fast", ProviderError::Timeout { timeout_ms: 500 });
        let chain = err.chain();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].contains("fast"));
        assert!(chain[1].contains("500 ms"));
    }

    #[test]
    fn storage_errors_map_onto_persist_kinds() {
        let conflict = StorageError::Conflict {
            path: "docs/a.md".into(),
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        assert_eq!(
            PipelineError::from(conflict).kind(),
            ErrorKind::PersistConflict
        );
        assert_eq!(
            PipelineError::from(StorageError::Unavailable("x".into())).kind(),
            ErrorKind::PersistUnavailable
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TransientFetchError).unwrap();
        assert_eq!(json, "\"transient_fetch_error\"");
    }
}
