//! Filesystem-backed document store and run archive.
//!
//! Disk I/O runs on tokio's blocking pool so a slow disk never stalls a
//! runtime worker and callers can bound an operation with a timeout.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Run `op` on the blocking pool.
async fn blocking<T, F>(op: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
}

/// Document store rooted at a directory.
///
/// Layout:
/// - `<root>/<document path>`: current document content
/// - `<root>/.autodoc/receipts/<idempotency key>.json`: write receipts
///
/// Documents are written to a temp file in the target directory and then
/// renamed into place, so an interrupted write never leaves partial content.
/// Writes are serialized; a write whose caller gave up still finishes before
/// the next one starts.
pub struct FsDocumentStore {
    layout: Arc<StoreLayout>,
    write_lock: Arc<Mutex<()>>,
}

struct StoreLayout {
    root: PathBuf,
    receipts_dir: PathBuf,
}

impl FsDocumentStore {
    /// Create a store rooted at `root`. Creates the receipt directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let receipts_dir = root.join(".autodoc").join("receipts");
        fs::create_dir_all(&receipts_dir)?;
        Ok(Self {
            layout: Arc::new(StoreLayout { root, receipts_dir }),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.layout.root
    }
}

impl StoreLayout {
    fn document_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn receipt_path(&self, key: &ContentDigest) -> PathBuf {
        self.receipts_dir.join(format!("{}.json", key.as_str()))
    }

    fn read_current(&self, relative: &str) -> StorageResult<Option<StoredDocument>> {
        match fs::read_to_string(self.document_path(relative)) {
            Ok(content) => Ok(Some(StoredDocument {
                path: relative.to_string(),
                revision: revision_of(&content),
                content,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn read_receipt(&self, key: &ContentDigest) -> StorageResult<Option<WriteReceipt>> {
        match fs::read(self.receipt_path(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write_receipt(&self, key: &ContentDigest, receipt: &WriteReceipt) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(receipt)?;
        write_atomic(&self.receipt_path(key), &bytes)
    }

    fn write_document(&self, relative: String, request: WriteRequest) -> StorageResult<WriteReceipt> {
        let target = self.document_path(&relative);
        let location = target.display().to_string();

        if let Some(mut receipt) = self.read_receipt(&request.idempotency_key)? {
            debug!(path = %relative, "replayed write recognised by receipt");
            receipt.created = false;
            return Ok(receipt);
        }

        let current = self.read_current(&relative)?.map(|d| d.revision);
        let requested = revision_of(&request.content);

        // Content landed earlier but the receipt did not.
        if current.as_ref() == Some(&requested) {
            let receipt = WriteReceipt {
                location,
                revision: requested,
                created: false,
            };
            self.write_receipt(&request.idempotency_key, &receipt)?;
            return Ok(receipt);
        }

        if current != request.base_revision {
            return Err(StorageError::Conflict {
                path: relative,
                expected: short_or_absent(request.base_revision.as_ref()),
                actual: short_or_absent(current.as_ref()),
            });
        }

        write_atomic(&target, request.content.as_bytes())?;
        let receipt = WriteReceipt {
            location,
            revision: requested,
            created: true,
        };
        self.write_receipt(&request.idempotency_key, &receipt)?;
        Ok(receipt)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, path: &str) -> StorageResult<Option<StoredDocument>> {
        let relative = normalize_document_path(path)?;
        let layout = Arc::clone(&self.layout);
        blocking(move || layout.read_current(&relative)).await
    }

    async fn write(&self, request: WriteRequest) -> StorageResult<WriteReceipt> {
        let relative = normalize_document_path(&request.path)?;
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let layout = Arc::clone(&self.layout);
        blocking(move || {
            let _guard = guard;
            layout.write_document(relative, request)
        })
        .await
    }
}

/// Append-only JSON-lines run archive (one `ArchivedRun` per line).
///
/// Archived run ids are indexed in memory the first time the archive is
/// written to, so appends never re-read the file.
pub struct JsonlRunArchive {
    path: Arc<PathBuf>,
    index: Arc<Mutex<Option<HashSet<RunId>>>>,
}

impl JsonlRunArchive {
    /// Open (or lazily create) an archive file at `path`.
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: Arc::new(path),
            index: Arc::new(Mutex::new(None)),
        })
    }

    async fn load(&self) -> StorageResult<Vec<ArchivedRun>> {
        let path = Arc::clone(&self.path);
        blocking(move || load_runs(&path)).await
    }
}

#[async_trait]
impl RunArchive for JsonlRunArchive {
    async fn archive(&self, run: ArchivedRun) -> StorageResult<()> {
        let mut index = Arc::clone(&self.index).lock_owned().await;
        let path = Arc::clone(&self.path);
        blocking(move || {
            if index.is_none() {
                *index = Some(load_runs(&path)?.into_iter().map(|r| r.run_id).collect());
            }
            let ids = index.get_or_insert_with(HashSet::new);
            if ids.contains(&run.run_id) {
                return Err(StorageError::DuplicateRun {
                    run_id: run.run_id.0.clone(),
                });
            }

            let mut line = serde_json::to_string(&run)?;
            line.push('\n');
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.as_path())?;
            file.write_all(line.as_bytes())?;
            file.sync_data()?;
            ids.insert(run.run_id);
            Ok(())
        })
        .await
    }

    async fn get(&self, run_id: &RunId) -> StorageResult<ArchivedRun> {
        let _guard = self.index.lock().await;
        self.load()
            .await?
            .into_iter()
            .find(|r| &r.run_id == run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn list(&self) -> StorageResult<Vec<ArchivedRun>> {
        let _guard = self.index.lock().await;
        self.load().await
    }
}

fn load_runs(path: &Path) -> StorageResult<Vec<ArchivedRun>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::Io(e)),
    };
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(StorageError::from))
        .collect()
}

fn write_atomic(target: &Path, data: &[u8]) -> StorageResult<()> {
    let dir = target
        .parent()
        .ok_or_else(|| StorageError::InvalidPath {
            path: target.display().to_string(),
        })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_data()?;
    tmp.persist(target).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

fn short_or_absent(revision: Option<&ContentDigest>) -> String {
    revision
        .map(|r| r.short().to_string())
        .unwrap_or_else(|| "<absent>".to_string())
}
