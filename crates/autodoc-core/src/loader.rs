//! Change data loading.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::diff::parse_unified_diff;
use crate::domain::{ChangeRequest, ChangeSet};
use crate::error::{PipelineError, Result};
use crate::glob::PathMatcher;

/// Capability that returns the raw unified diff for a change request.
///
/// Implementations report an unresolvable reference as
/// [`PipelineError::SourceUnavailable`] and network trouble as
/// [`PipelineError::TransientFetchError`]. The request's credential is for
/// the transport only.
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn fetch_diff(&self, request: &ChangeRequest) -> Result<Vec<u8>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Loads and parses the change set of a request.
#[derive(Clone)]
pub struct ChangeLoader {
    source: Arc<dyn DiffSource>,
}

impl ChangeLoader {
    pub fn new(source: Arc<dyn DiffSource>) -> Self {
        Self { source }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch the diff, parse it and apply the request's path filter.
    ///
    /// An empty change set is a valid result.
    pub async fn load(&self, request: &ChangeRequest) -> Result<ChangeSet> {
        let filter = request
            .path_filter()
            .map(|f| PathMatcher::new([f]))
            .transpose()?;

        let raw = self.source.fetch_diff(request).await?;
        let change_set = parse_unified_diff(&raw);
        let parsed = change_set.len();

        let change_set = match filter {
            Some(matcher) => change_set.retain(|c| {
                matcher.is_match(&c.path)
                    || c.old_path.as_deref().is_some_and(|p| matcher.is_match(p))
            }),
            None => change_set,
        };

        debug!(
            source = self.source.name(),
            bytes = raw.len(),
            parsed,
            kept = change_set.len(),
            "change set loaded"
        );
        Ok(change_set)
    }
}

/// Reads a diff from a local file, for manual invocations.
#[derive(Debug, Clone)]
pub struct FileDiffSource {
    path: PathBuf,
}

impl FileDiffSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiffSource for FileDiffSource {
    async fn fetch_diff(&self, _request: &ChangeRequest) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            let detail = format!("{}: {e}", self.path.display());
            match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    PipelineError::SourceUnavailable(detail)
                }
                _ => PipelineError::TransientFetchError(detail),
            }
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}
