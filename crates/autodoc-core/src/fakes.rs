//! Scripted collaborators for tests and dry runs.
//!
//! `ScriptedDiffSource`, `CannedProvider` and `FlakyDocumentStore` stand in
//! for the network-bound capabilities and count how often they are called.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autodoc_state::fakes::MemoryDocumentStore;
use autodoc_state::{DocumentStore, StorageError, StorageResult, StoredDocument, WriteReceipt, WriteRequest};

use crate::domain::ChangeRequest;
use crate::error::{PipelineError, ProviderError, Result};
use crate::generator::{CompletionOptions, CompletionProvider, ProviderKind};
use crate::loader::DiffSource;

// ---------------------------------------------------------------------------
// ScriptedDiffSource
// ---------------------------------------------------------------------------

/// Diff source that replays a script of results, then a fallback diff.
#[derive(Debug, Default)]
pub struct ScriptedDiffSource {
    script: Mutex<VecDeque<Result<Vec<u8>>>>,
    fallback: Option<Vec<u8>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedDiffSource {
    /// Results are returned in order; once exhausted, calls fail with
    /// `SourceUnavailable` unless a fallback is set with [`then`](Self::then).
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map(String::into_bytes))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn always(diff: &str) -> Self {
        Self::new(Vec::new()).then(diff)
    }

    pub fn then(mut self, diff: &str) -> Self {
        self.fallback = Some(diff.as_bytes().to_vec());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiffSource for ScriptedDiffSource {
    async fn fetch_diff(&self, _request: &ChangeRequest) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(diff)) => Ok(diff.clone()),
            (None, None) => Err(PipelineError::SourceUnavailable(
                "diff script exhausted".into(),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// CannedProvider
// ---------------------------------------------------------------------------

/// Completion provider with a fixed answer.
#[derive(Debug)]
pub struct CannedProvider {
    kind: ProviderKind,
    response: std::result::Result<String, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl CannedProvider {
    pub fn new(kind: ProviderKind, text: &str) -> Self {
        Self::with_response(kind, Ok(text.to_string()))
    }

    pub fn failing(kind: ProviderKind, error: ProviderError) -> Self {
        Self::with_response(kind, Err(error))
    }

    fn with_response(kind: ProviderKind, response: std::result::Result<String, ProviderError>) -> Self {
        Self {
            kind,
            response,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for CannedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// FlakyDocumentStore
// ---------------------------------------------------------------------------

/// Document store whose first writes fail with `Unavailable`.
///
/// With [`losing_responses`](Self::losing_responses) the failing writes land
/// in the inner store before the error is returned, modelling a save whose
/// acknowledgement was lost.
#[derive(Debug)]
pub struct FlakyDocumentStore {
    inner: Arc<MemoryDocumentStore>,
    failures_left: AtomicU32,
    land_before_failing: bool,
    write_calls: AtomicUsize,
}

impl FlakyDocumentStore {
    pub fn new(inner: Arc<MemoryDocumentStore>, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
            land_before_failing: false,
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn losing_responses(inner: Arc<MemoryDocumentStore>, failures: u32) -> Self {
        Self {
            land_before_failing: true,
            ..Self::new(inner, failures)
        }
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn read(&self, path: &str) -> StorageResult<Option<StoredDocument>> {
        self.inner.read(path).await
    }

    async fn write(&self, request: WriteRequest) -> StorageResult<WriteReceipt> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            if self.land_before_failing {
                self.inner.write(request).await?;
            }
            return Err(StorageError::Unavailable("connection reset by peer".into()));
        }
        self.inner.write(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Credential;

    #[tokio::test]
    async fn scripted_source_replays_then_falls_back() {
        let source = ScriptedDiffSource::new(vec![Err(PipelineError::TransientFetchError(
            "reset".into(),
        ))])
        .then("diff");
        let req = ChangeRequest::commit("acme/api", "abc", Credential::anonymous());

        assert!(source.fetch_diff(&req).await.is_err());
        assert_eq!(source.fetch_diff(&req).await.unwrap(), b"diff");
        assert_eq!(source.fetch_diff(&req).await.unwrap(), b"diff");
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn flaky_store_recovers_after_failures() {
        let inner = Arc::new(MemoryDocumentStore::new());
        let store = FlakyDocumentStore::new(inner.clone(), 1);
        let req = WriteRequest::new("docs/a.md", "x", None);

        assert!(store.write(req.clone()).await.is_err());
        assert_eq!(inner.artifact_count(), 0);
        assert!(store.write(req).await.unwrap().created);
        assert_eq!(store.write_calls(), 2);
    }
}
