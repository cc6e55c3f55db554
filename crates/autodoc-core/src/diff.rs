//! Git unified-diff parsing.
//!
//! Turns the raw output of `git diff` / the GitHub diff media type into a
//! [`ChangeSet`]. Each `diff --git` section becomes one [`FileChange`];
//! anything before the first section (commit headers, mail headers) is
//! ignored, and input without any section parses to an empty set.

use crate::domain::{ChangeKind, ChangeSet, FileChange};

/// Parse raw diff bytes. Invalid UTF-8 is decoded lossily.
pub fn parse_unified_diff(raw: &[u8]) -> ChangeSet {
    let text = String::from_utf8_lossy(raw);
    let mut entries = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(section) = current.take() {
                entries.push(section.finish());
            }
            current = Some(Section::from_header(rest));
            continue;
        }
        if let Some(section) = current.as_mut() {
            section.feed(line);
        }
    }
    if let Some(section) = current.take() {
        entries.push(section.finish());
    }
    ChangeSet::new(entries)
}

#[derive(Debug, Default)]
struct Section {
    header_old: Option<String>,
    header_new: Option<String>,
    minus_path: Option<String>,
    plus_path: Option<String>,
    rename_from: Option<String>,
    rename_to: Option<String>,
    new_file: bool,
    deleted_file: bool,
    in_hunk: bool,
    patch: String,
}

impl Section {
    fn from_header(rest: &str) -> Self {
        let (old, new) = split_header_paths(rest);
        Self {
            header_old: old,
            header_new: new,
            ..Default::default()
        }
    }

    fn feed(&mut self, line: &str) {
        if self.in_hunk {
            if is_hunk_line(line) {
                self.push_patch(line);
                return;
            }
            self.in_hunk = false;
        }

        if line.starts_with("@@") {
            self.in_hunk = true;
            self.push_patch(line);
        } else if line.starts_with("new file mode") {
            self.new_file = true;
        } else if line.starts_with("deleted file mode") {
            self.deleted_file = true;
        } else if let Some(p) = line.strip_prefix("rename from ") {
            self.rename_from = Some(unquote(p));
        } else if let Some(p) = line.strip_prefix("rename to ") {
            self.rename_to = Some(unquote(p));
        } else if let Some(p) = line.strip_prefix("--- ") {
            self.minus_path = Some(strip_side(p, "a/"));
        } else if let Some(p) = line.strip_prefix("+++ ") {
            self.plus_path = Some(strip_side(p, "b/"));
        } else if let Some(p) = line.strip_prefix("Binary files ") {
            self.read_binary_marker(p);
        }
    }

    fn push_patch(&mut self, line: &str) {
        self.patch.push_str(line);
        self.patch.push('\n');
    }

    /// `Binary files a/x and /dev/null differ`
    fn read_binary_marker(&mut self, rest: &str) {
        let rest = rest.trim_end_matches(" differ");
        if let Some((old, new)) = rest.split_once(" and ") {
            self.minus_path = Some(strip_side(old, "a/"));
            self.plus_path = Some(strip_side(new, "b/"));
        }
    }

    fn finish(self) -> FileChange {
        let minus_null = self.minus_path.as_deref() == Some(DEV_NULL);
        let plus_null = self.plus_path.as_deref() == Some(DEV_NULL);

        let kind = if self.new_file || minus_null {
            ChangeKind::Added
        } else if self.deleted_file || plus_null {
            ChangeKind::Deleted
        } else if self.rename_from.is_some() || self.rename_to.is_some() {
            ChangeKind::Renamed
        } else {
            ChangeKind::Modified
        };

        let old_path = self
            .rename_from
            .clone()
            .or_else(|| self.minus_path.clone().filter(|p| p != DEV_NULL))
            .or_else(|| self.header_old.clone());
        let new_path = self
            .rename_to
            .clone()
            .or_else(|| self.plus_path.clone().filter(|p| p != DEV_NULL))
            .or_else(|| self.header_new.clone());

        let path = match kind {
            ChangeKind::Deleted => old_path.clone().or(new_path),
            _ => new_path.or_else(|| old_path.clone()),
        }
        .unwrap_or_default();

        FileChange {
            path,
            old_path: if kind == ChangeKind::Renamed { old_path } else { None },
            kind,
            patch: self.patch,
        }
    }
}

const DEV_NULL: &str = "/dev/null";

/// Hunk body lines: context, additions, removals and the no-newline marker.
fn is_hunk_line(line: &str) -> bool {
    line.is_empty()
        || line.starts_with(' ')
        || line.starts_with('+')
        || line.starts_with('-')
        || line.starts_with('\\')
        || line.starts_with("@@")
}

/// `a/src/lib.rs b/src/lib.rs` (paths may be quoted)
fn split_header_paths(rest: &str) -> (Option<String>, Option<String>) {
    let rest = rest.trim();
    if let Some(stripped) = rest.strip_prefix('"') {
        if let Some(end) = stripped.find('"') {
            let old = &stripped[..end];
            let new = stripped[end + 1..].trim();
            return (
                Some(strip_side(old, "a/")),
                Some(strip_side(new, "b/")),
            );
        }
    }
    match rest.find(" b/") {
        Some(idx) => (
            Some(strip_side(&rest[..idx], "a/")),
            Some(strip_side(&rest[idx + 1..], "b/")),
        ),
        None => (None, None),
    }
}

fn strip_side(path: &str, prefix: &str) -> String {
    let path = unquote(path.split('\t').next().unwrap_or(path).trim());
    match path.strip_prefix(prefix) {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
        .to_string()
}
