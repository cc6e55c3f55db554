//! autodoc-state: persistence boundary for the autodoc pipeline
//!
//! This crate owns everything the pipeline writes outside of a run:
//! the target documents it updates and the archive of finished runs.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: idempotent writes, conflict detection, append-only audit.
//!
//! ## Key Components
//!
//! - `DocumentStore`: read/write target documents keyed by revision
//! - `RunArchive`: keep terminal runs for audit
//! - `FsDocumentStore` / `JsonlRunArchive`: filesystem backends
//! - `fakes`: in-memory backends for tests

mod error;
pub mod fakes;
pub mod fs;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::{FsDocumentStore, JsonlRunArchive};
pub use storage_traits::{
    idempotency_key, normalize_document_path, revision_of, ArchivedRun, ContentDigest,
    DocumentStore, RunArchive, RunId, StorageResult, StoredDocument, WriteReceipt, WriteRequest,
};
