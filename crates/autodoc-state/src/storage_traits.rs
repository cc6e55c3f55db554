//! Storage trait definitions for autodoc
//!
//! These traits define the persistence boundaries of the pipeline:
//! - `DocumentStore`: read the current target document, write a new revision
//! - `RunArchive`: keep terminal pipeline runs for audit
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_parts(&[data])
    }

    /// Compute the SHA-256 digest of several byte slices, each followed by a
    /// NUL separator so that `("ab", "c")` and `("a", "bc")` differ.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
            hasher.update(b"\0");
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revision of a stored document: the digest of its content.
pub fn revision_of(content: &str) -> ContentDigest {
    ContentDigest::from_bytes(content.as_bytes())
}

/// Idempotency key for writing `content` to `path`.
pub fn idempotency_key(path: &str, content: &str) -> ContentDigest {
    ContentDigest::from_parts(&[path.as_bytes(), content.as_bytes()])
}

/// Normalize a store-relative document path.
///
/// Strips a leading `./`, converts backslashes, and rejects empty, absolute
/// or parent-escaping paths.
pub fn normalize_document_path(path: &str) -> StorageResult<String> {
    let unified = path.trim().replace('\\', "/");
    let trimmed = unified.trim_start_matches("./");
    let invalid = || StorageError::InvalidPath {
        path: path.to_string(),
    };

    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.contains(':') {
        return Err(invalid());
    }

    let mut parts = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid()),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

// ---------------------------------------------------------------------------
// DocumentStore: target document persistence
// ---------------------------------------------------------------------------

/// A document as currently persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub path: String,
    pub content: String,
    pub revision: ContentDigest,
}

/// A request to persist a new document revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Store-relative target path.
    pub path: String,
    /// Full new content.
    pub content: String,
    /// Key identifying this exact write; replays with the same key are no-ops.
    pub idempotency_key: ContentDigest,
    /// Revision the writer based its content on (`None` = document did not exist).
    pub base_revision: Option<ContentDigest>,
}

impl WriteRequest {
    /// Build a request whose idempotency key is derived from path + content.
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        base_revision: Option<ContentDigest>,
    ) -> Self {
        let path = path.into();
        let content = content.into();
        let idempotency_key = idempotency_key(&path, &content);
        Self {
            path,
            content,
            idempotency_key,
            base_revision,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Where the document now lives (URI or filesystem path).
    pub location: String,
    /// Revision now stored at the target.
    pub revision: ContentDigest,
    /// `false` when the write was recognised as a replay and nothing changed.
    pub created: bool,
}

/// Writable document store.
///
/// Guarantees:
/// - `write` is idempotent per `idempotency_key`: replaying a request that
///   already succeeded returns the original receipt with `created = false`
///   and never produces a second artifact.
/// - `write` fails with `StorageError::Conflict` when the current revision
///   differs from `base_revision` (no auto-merge).
/// - A write is all-or-nothing; a cancelled write leaves the previous revision.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the current document at `path`, `None` if it does not exist.
    async fn read(&self, path: &str) -> StorageResult<Option<StoredDocument>>;

    /// Persist a new revision.
    async fn write(&self, request: WriteRequest) -> StorageResult<WriteReceipt>;
}

// ---------------------------------------------------------------------------
// RunArchive: terminal pipeline runs
// ---------------------------------------------------------------------------

/// Unique identifier for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A terminal run as kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRun {
    pub run_id: RunId,
    /// Terminal state name (`done`, `skipped`, `deferred`, `failed`).
    pub terminal_state: String,
    /// Serialized run report.
    pub report: serde_json::Value,
    pub archived_at: DateTime<Utc>,
}

/// Append-only archive of terminal runs.
#[async_trait]
pub trait RunArchive: Send + Sync {
    /// Store a run. Archiving the same run id twice replaces nothing and errors.
    async fn archive(&self, run: ArchivedRun) -> StorageResult<()>;

    /// Fetch an archived run by id.
    async fn get(&self, run_id: &RunId) -> StorageResult<ArchivedRun>;

    /// All archived runs in archive order.
    async fn list(&self) -> StorageResult<Vec<ArchivedRun>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let a = ContentDigest::from_bytes(b"hello");
        let b = ContentDigest::from_bytes(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn from_parts_separates_boundaries() {
        let left = ContentDigest::from_parts(&[b"ab", b"c"]);
        let right = ContentDigest::from_parts(&[b"a", b"bc"]);
        assert_ne!(left, right);
    }

    #[test]
    fn try_from_rejects_garbage() {
        assert!(ContentDigest::try_from("xyz".to_string()).is_err());
        let valid = ContentDigest::from_bytes(b"x").to_string().to_uppercase();
        let parsed = ContentDigest::try_from(valid).unwrap();
        assert_eq!(parsed, ContentDigest::from_bytes(b"x"));
    }

    #[test]
    fn idempotency_key_depends_on_path_and_content() {
        let k1 = idempotency_key("docs/a.md", "body");
        let k2 = idempotency_key("docs/b.md", "body");
        let k3 = idempotency_key("docs/a.md", "other");
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1, idempotency_key("docs/a.md", "body"));
    }

    #[test]
    fn normalize_accepts_relative_paths() {
        assert_eq!(
            normalize_document_path("./docs//CHANGES.md").unwrap(),
            "docs/CHANGES.md"
        );
        assert_eq!(normalize_document_path("docs\\api.md").unwrap(), "docs/api.md");
    }

    #[test]
    fn normalize_rejects_escapes() {
        for bad in ["", "/etc/passwd", "../secret.md", "docs/../../x", "C:/x", "./"] {
            assert!(
                matches!(
                    normalize_document_path(bad),
                    Err(StorageError::InvalidPath { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn write_request_derives_key() {
        let req = WriteRequest::new("docs/a.md", "body", None);
        assert_eq!(req.idempotency_key, idempotency_key("docs/a.md", "body"));
    }
}
