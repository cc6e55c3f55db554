//! Error types for autodoc-state

use thiserror::Error;

/// Errors that can occur in the document/run persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Target document changed since the writer last observed it
    #[error("Document {path} changed concurrently (expected revision {expected}, found {actual})")]
    Conflict {
        path: String,
        expected: String,
        actual: String,
    },

    /// Backend could not be reached or refused the operation transiently
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Document path is absolute, empty or escapes the store root
    #[error("Invalid document path: {path}")]
    InvalidPath { path: String },

    /// Archived run not found
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Run id already present in the archive
    #[error("Run already archived: {run_id}")]
    DuplicateRun { run_id: String },

    /// Digest string is not 64 lowercase hex characters
    #[error("Invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Io(_))
    }
}
