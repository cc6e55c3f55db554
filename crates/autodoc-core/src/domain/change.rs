//! Loaded change data.

use serde::{Deserialize, Serialize};

/// How a file was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        }
    }
}

/// One file's change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path after the change (the old path for deletions).
    pub path: String,
    /// Path before a rename.
    pub old_path: Option<String>,
    pub kind: ChangeKind,
    /// Hunk text (`@@` headers and `+`/`-`/` ` lines).
    pub patch: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind, patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            kind,
            patch: patch.into(),
        }
    }

    /// Added lines in the patch.
    pub fn lines_added(&self) -> usize {
        self.patch_lines('+').count()
    }

    /// Removed lines in the patch.
    pub fn lines_removed(&self) -> usize {
        self.patch_lines('-').count()
    }

    pub fn lines_touched(&self) -> usize {
        self.lines_added() + self.lines_removed()
    }

    /// Added and removed lines without their `+`/`-` marker.
    pub fn changed_lines(&self) -> impl Iterator<Item = &str> {
        self.patch_lines('+').chain(self.patch_lines('-'))
    }

    fn patch_lines(&self, marker: char) -> impl Iterator<Item = &str> {
        self.patch
            .lines()
            .filter(move |l| l.starts_with(marker))
            .map(|l| &l[1..])
    }
}

/// Ordered file changes of one request. An empty set is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: Vec<FileChange>,
}

impl ChangeSet {
    pub fn new(entries: Vec<FileChange>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[FileChange] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lines_touched(&self) -> usize {
        self.entries.iter().map(FileChange::lines_touched).sum()
    }

    /// Keep only entries for which `keep` returns true, preserving order.
    pub fn retain(mut self, keep: impl FnMut(&FileChange) -> bool) -> Self {
        self.entries.retain(keep);
        self
    }
}

impl FromIterator<FileChange> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = FileChange>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
