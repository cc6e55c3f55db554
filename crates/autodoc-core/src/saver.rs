//! Document persistence.

use std::sync::Arc;

use autodoc_state::{DocumentStore, WriteRequest};
use tracing::debug;

use crate::domain::{DraftDocument, SaveResult, TargetDocument};
use crate::error::Result;

/// Writes drafts through a [`DocumentStore`].
///
/// Every write carries `sha256(path \0 content)` as its idempotency key and
/// the draft's base revision, so a retried save never produces a second
/// artifact and a concurrently modified target is reported as
/// `PersistConflict` rather than overwritten.
#[derive(Clone)]
pub struct DocumentSaver {
    store: Arc<dyn DocumentStore>,
}

impl DocumentSaver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Current state of the target, used as generation context.
    pub async fn read_target(&self, path: &str) -> Result<TargetDocument> {
        Ok(match self.store.read(path).await? {
            Some(doc) => TargetDocument::from_stored(doc),
            None => TargetDocument::new(path),
        })
    }

    pub async fn save(&self, draft: &DraftDocument) -> Result<SaveResult> {
        let request = WriteRequest::new(
            draft.target_path.clone(),
            draft.content.clone(),
            draft.base_revision.clone(),
        );
        let key = request.idempotency_key.clone();
        let receipt = self.store.write(request).await?;
        debug!(
            location = %receipt.location,
            key = key.short(),
            created = receipt.created,
            "draft saved"
        );
        Ok(SaveResult::saved(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::generator::ProviderKind;
    use autodoc_state::fakes::MemoryDocumentStore;
    use chrono::Utc;

    fn draft(target: &TargetDocument, content: &str) -> DraftDocument {
        DraftDocument {
            target_path: target.path.clone(),
            content: content.into(),
            provider: ProviderKind::Primary,
            generated_at: Utc::now(),
            base_revision: target.base_revision.clone(),
        }
    }

    #[tokio::test]
    async fn saving_twice_creates_one_artifact() {
        let store = Arc::new(MemoryDocumentStore::new());
        let saver = DocumentSaver::new(store.clone());
        let target = saver.read_target("docs/CHANGES.md").await.unwrap();
        let draft = draft(&target, "# Changes\n");

        let first = saver.save(&draft).await.unwrap();
        let second = saver.save(&draft).await.unwrap();

        assert!(first.success && first.created);
        assert!(second.success && !second.created);
        assert_eq!(first.location, second.location);
        assert_eq!(store.artifact_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_modification_is_a_conflict() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.seed("docs/CHANGES.md", "v1");
        let saver = DocumentSaver::new(store.clone());
        let target = saver.read_target("docs/CHANGES.md").await.unwrap();
        assert_eq!(target.existing_content.as_deref(), Some("v1"));

        store.seed("docs/CHANGES.md", "edited by someone else");
        let err = saver.save(&draft(&target, "v2")).await.unwrap_err();
        assert!(matches!(err, PipelineError::PersistConflict { .. }));
        assert_eq!(store.artifact_count(), 0);
    }

    #[tokio::test]
    async fn missing_target_has_no_base_revision() {
        let saver = DocumentSaver::new(Arc::new(MemoryDocumentStore::new()));
        let target = saver.read_target("docs/NEW.md").await.unwrap();
        assert!(target.base_revision.is_none());
        assert!(target.existing_content.is_none());
    }
}
