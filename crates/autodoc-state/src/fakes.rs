//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryDocumentStore` and `MemoryRunArchive` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DocumentState {
    current: HashMap<String, StoredDocument>,
    receipts: HashMap<ContentDigest, WriteReceipt>,
    artifacts: Vec<StoredDocument>,
}

/// In-memory document store. Every created revision is kept as an artifact
/// so tests can assert how many writes actually landed.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document in place without recording an artifact.
    pub fn seed(&self, path: &str, content: &str) {
        let path = normalize_document_path(path).unwrap_or_else(|_| path.to_string());
        let mut state = self.state.lock().unwrap();
        state.current.insert(
            path.clone(),
            StoredDocument {
                path,
                content: content.to_string(),
                revision: revision_of(content),
            },
        );
    }

    /// Number of revisions created through `write`.
    pub fn artifact_count(&self) -> usize {
        self.state.lock().unwrap().artifacts.len()
    }

    /// All revisions created through `write`, oldest first.
    pub fn artifacts(&self) -> Vec<StoredDocument> {
        self.state.lock().unwrap().artifacts.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &str) -> StorageResult<Option<StoredDocument>> {
        let path = normalize_document_path(path)?;
        let state = self.state.lock().unwrap();
        Ok(state.current.get(&path).cloned())
    }

    async fn write(&self, request: WriteRequest) -> StorageResult<WriteReceipt> {
        let path = normalize_document_path(&request.path)?;
        let mut state = self.state.lock().unwrap();

        if let Some(receipt) = state.receipts.get(&request.idempotency_key) {
            let mut replay = receipt.clone();
            replay.created = false;
            return Ok(replay);
        }

        let current = state.current.get(&path).map(|d| d.revision.clone());
        let requested = revision_of(&request.content);
        if current.as_ref() == Some(&requested) {
            let receipt = WriteReceipt {
                location: format!("memory://{path}"),
                revision: requested,
                created: false,
            };
            state
                .receipts
                .insert(request.idempotency_key, receipt.clone());
            return Ok(receipt);
        }
        if current != request.base_revision {
            return Err(StorageError::Conflict {
                path,
                expected: describe(request.base_revision.as_ref()),
                actual: describe(current.as_ref()),
            });
        }

        let doc = StoredDocument {
            path: path.clone(),
            revision: requested,
            content: request.content,
        };
        let receipt = WriteReceipt {
            location: format!("memory://{path}"),
            revision: doc.revision.clone(),
            created: true,
        };
        state.current.insert(path, doc.clone());
        state.artifacts.push(doc);
        state
            .receipts
            .insert(request.idempotency_key, receipt.clone());
        Ok(receipt)
    }
}

fn describe(revision: Option<&ContentDigest>) -> String {
    revision
        .map(|r| r.short().to_string())
        .unwrap_or_else(|| "<absent>".to_string())
}

// ---------------------------------------------------------------------------
// MemoryRunArchive
// ---------------------------------------------------------------------------

/// In-memory run archive backed by a `Vec` in archive order.
#[derive(Debug, Default)]
pub struct MemoryRunArchive {
    runs: Mutex<Vec<ArchivedRun>>,
}

impl MemoryRunArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunArchive for MemoryRunArchive {
    async fn archive(&self, run: ArchivedRun) -> StorageResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if runs.iter().any(|r| r.run_id == run.run_id) {
            return Err(StorageError::DuplicateRun {
                run_id: run.run_id.0.clone(),
            });
        }
        runs.push(run);
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> StorageResult<ArchivedRun> {
        let runs = self.runs.lock().unwrap();
        runs.iter()
            .find(|r| &r.run_id == run_id)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn list(&self) -> StorageResult<Vec<ArchivedRun>> {
        Ok(self.runs.lock().unwrap().clone())
    }
}
