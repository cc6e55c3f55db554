//! Trait contract tests for DocumentStore and RunArchive.
//!
//! These tests verify the behavioral contracts of the storage traits
//! against both the in-memory fakes and the filesystem backends.

use std::sync::Arc;

use autodoc_state::fakes::{MemoryDocumentStore, MemoryRunArchive};
use autodoc_state::storage_traits::*;
use autodoc_state::{FsDocumentStore, JsonlRunArchive, StorageError};
use chrono::Utc;

fn stores() -> Vec<(tempfile::TempDir, Arc<dyn DocumentStore>)> {
    let mem_dir = tempfile::tempdir().unwrap();
    let fs_dir = tempfile::tempdir().unwrap();
    let fs_store = FsDocumentStore::new(fs_dir.path()).unwrap();
    vec![
        (mem_dir, Arc::new(MemoryDocumentStore::new())),
        (fs_dir, Arc::new(fs_store)),
    ]
}

// ===========================================================================
// DocumentStore contract tests
// ===========================================================================

#[tokio::test]
async fn doc_write_creates_revision_of_content() {
    for (_dir, store) in stores() {
        let receipt = store
            .write(WriteRequest::new("docs/CHANGES.md", "hello", None))
            .await
            .unwrap();
        assert!(receipt.created);
        assert_eq!(receipt.revision, revision_of("hello"));
    }
}

#[tokio::test]
async fn doc_same_request_twice_is_idempotent() {
    for (_dir, store) in stores() {
        let req = WriteRequest::new("docs/CHANGES.md", "hello", None);
        let first = store.write(req.clone()).await.unwrap();
        let second = store.write(req).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.location, second.location);
        let doc = store.read("docs/CHANGES.md").await.unwrap().unwrap();
        assert_eq!(doc.content, "hello");
    }
}

#[tokio::test]
async fn doc_update_with_current_base_succeeds() {
    for (_dir, store) in stores() {
        let v1 = store
            .write(WriteRequest::new("docs/a.md", "v1", None))
            .await
            .unwrap();
        let v2 = store
            .write(WriteRequest::new("docs/a.md", "v2", Some(v1.revision)))
            .await
            .unwrap();
        assert!(v2.created);
        let doc = store.read("docs/a.md").await.unwrap().unwrap();
        assert_eq!(doc.content, "v2");
    }
}

#[tokio::test]
async fn doc_update_with_stale_base_conflicts() {
    for (_dir, store) in stores() {
        let v1 = store
            .write(WriteRequest::new("docs/a.md", "v1", None))
            .await
            .unwrap();
        store
            .write(WriteRequest::new("docs/a.md", "v2", Some(v1.revision.clone())))
            .await
            .unwrap();

        let err = store
            .write(WriteRequest::new("docs/a.md", "v3", Some(v1.revision)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert!(!err.is_transient());
    }
}

#[tokio::test]
async fn memory_store_counts_one_artifact_per_distinct_write() {
    let store = MemoryDocumentStore::new();
    let req = WriteRequest::new("docs/a.md", "body", None);
    store.write(req.clone()).await.unwrap();
    store.write(req.clone()).await.unwrap();
    store.write(req).await.unwrap();

    assert_eq!(store.artifact_count(), 1);
}

#[tokio::test]
async fn memory_store_seed_is_readable_without_artifact() {
    let store = MemoryDocumentStore::new();
    store.seed("docs/a.md", "existing");
    let doc = store.read("docs/a.md").await.unwrap().unwrap();

    assert_eq!(doc.revision, revision_of("existing"));
    assert_eq!(store.artifact_count(), 0);
}

// ===========================================================================
// RunArchive contract tests
// ===========================================================================

fn archived(state: &str) -> ArchivedRun {
    ArchivedRun {
        run_id: RunId::new(),
        terminal_state: state.to_string(),
        report: serde_json::json!({ "state": state }),
        archived_at: Utc::now(),
    }
}

#[tokio::test]
async fn archive_preserves_order_and_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let archives: Vec<Arc<dyn RunArchive>> = vec![
        Arc::new(MemoryRunArchive::new()),
        Arc::new(JsonlRunArchive::new(dir.path().join("archive.jsonl")).unwrap()),
    ];

    for archive in archives {
        let a = archived("done");
        let b = archived("failed");
        archive.archive(a.clone()).await.unwrap();
        archive.archive(b.clone()).await.unwrap();

        let listed = archive.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].run_id, a.run_id);
        assert_eq!(listed[1].run_id, b.run_id);

        let err = archive.archive(a).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateRun { .. }));
    }
}

#[tokio::test]
async fn archive_get_unknown_run_fails() {
    let archive = MemoryRunArchive::new();
    let err = archive.get(&RunId::new()).await.unwrap_err();
    assert!(matches!(err, StorageError::RunNotFound { .. }));
}
