//! Generated documents and save outcomes.

use autodoc_state::{idempotency_key, ContentDigest, StoredDocument, WriteReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::generator::ProviderKind;

/// The document a run targets, as observed before generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDocument {
    pub path: String,
    pub existing_content: Option<String>,
    pub base_revision: Option<ContentDigest>,
}

impl TargetDocument {
    /// A target that does not exist yet.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            existing_content: None,
            base_revision: None,
        }
    }

    pub fn from_stored(doc: StoredDocument) -> Self {
        Self {
            path: doc.path,
            existing_content: Some(doc.content),
            base_revision: Some(doc.revision),
        }
    }
}

/// Generator output awaiting persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftDocument {
    pub target_path: String,
    pub content: String,
    pub provider: ProviderKind,
    pub generated_at: DateTime<Utc>,
    /// Revision of the target the content was generated against.
    pub base_revision: Option<ContentDigest>,
}

impl DraftDocument {
    /// Key under which saving this draft is idempotent.
    pub fn idempotency_key(&self) -> ContentDigest {
        idempotency_key(&self.target_path, &self.content)
    }
}

/// Outcome of the save stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    pub location: Option<String>,
    /// `false` when the save was a replay of an earlier successful write.
    pub created: bool,
    pub error: Option<String>,
}

impl SaveResult {
    pub fn saved(receipt: WriteReceipt) -> Self {
        Self {
            success: true,
            location: Some(receipt.location),
            created: receipt.created,
            error: None,
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            location: None,
            created: false,
            error: Some(error.to_string()),
        }
    }
}
