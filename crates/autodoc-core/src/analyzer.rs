//! Change analysis.
//!
//! [`ChangeAnalyzer::analyze`] is a pure function of the change set. Per-file
//! judgement is delegated to a [`ChangeClassifier`]; the analyzer owns the
//! scoring policy, the threshold and the always-document rule.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::domain::{ChangeKind, ChangeSet, ChangeSignal, FileChange};
use crate::error::Result;
use crate::glob::PathMatcher;

const DOC_RELEVANT_WEIGHT: f64 = 0.4;
const MAGNITUDE_WEIGHT: f64 = 0.2;
const INTERFACE_WEIGHT: f64 = 0.4;
/// Lines touched at which the magnitude term saturates.
const MAGNITUDE_SATURATION: f64 = 200.0;
const SUMMARY_MAX_FILES: usize = 10;

/// Closed topic taxonomy.
pub mod topics {
    pub const API: &str = "api";
    pub const DOCS: &str = "docs";
    pub const SOURCE: &str = "source";
    pub const CONFIG: &str = "config";
    pub const DEPENDENCIES: &str = "dependencies";
    pub const BUILD: &str = "build";
    pub const TESTS: &str = "tests";
    pub const ADDED_FILES: &str = "added-files";
    pub const REMOVED_FILES: &str = "removed-files";
    pub const RENAMED_FILES: &str = "renamed-files";

    pub const ALL: [&str; 10] = [
        API,
        DOCS,
        SOURCE,
        CONFIG,
        DEPENDENCIES,
        BUILD,
        TESTS,
        ADDED_FILES,
        REMOVED_FILES,
        RENAMED_FILES,
    ];
}

/// Per-file verdict of a classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileClassification {
    /// Excluded from relevance entirely (tests, lock files, CI metadata).
    pub ignored: bool,
    pub doc_relevant: bool,
    pub public_interface: bool,
    /// Tags from [`topics::ALL`]; anything else is dropped by the analyzer.
    pub topics: BTreeSet<String>,
}

/// Swappable per-file classification.
///
/// Must be deterministic and free of I/O so the analyzer stays pure.
pub trait ChangeClassifier: Send + Sync {
    fn classify(&self, change: &FileChange) -> FileClassification;
}

/// Path- and declaration-based classifier.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    doc_relevant: PathMatcher,
    public_interface: PathMatcher,
    ignored: PathMatcher,
}

const DECLARATION_PREFIXES: &[&str] = &[
    "pub fn ",
    "pub struct ",
    "pub enum ",
    "pub trait ",
    "pub mod ",
    "def ",
    "class ",
    "export ",
    "func ",
    "public ",
    "interface ",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cc", "cpp", "hpp", "cs",
    "rb", "php", "swift", "scala", "proto", "graphql",
];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "ini", "cfg", "conf", "json", "env"];
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "adoc", "txt"];
const DEPENDENCY_FILES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.mod",
    "go.sum",
    "pyproject.toml",
    "poetry.lock",
    "Pipfile",
    "Pipfile.lock",
    "Gemfile",
    "Gemfile.lock",
    "pom.xml",
];
const BUILD_FILES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "build.rs",
    "CMakeLists.txt",
    "build.gradle",
    "Justfile",
    ".gitlab-ci.yml",
];

impl HeuristicClassifier {
    pub fn new(doc_relevant: PathMatcher, public_interface: PathMatcher, ignored: PathMatcher) -> Self {
        Self {
            doc_relevant,
            public_interface,
            ignored,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(
            PathMatcher::new(&config.doc_relevant_paths)?,
            PathMatcher::new(&config.public_interface_paths)?,
            PathMatcher::new(&config.ignored_paths)?,
        ))
    }

    fn path_topics(path: &str) -> BTreeSet<String> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let ext = file_name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        let mut tags = BTreeSet::new();

        if is_test_path(path, file_name) {
            tags.insert(topics::TESTS.to_string());
        }
        if DEPENDENCY_FILES.contains(&file_name) || file_name.starts_with("requirements") {
            tags.insert(topics::DEPENDENCIES.to_string());
        } else if BUILD_FILES.contains(&file_name) || path.starts_with(".github/") {
            tags.insert(topics::BUILD.to_string());
        } else if CONFIG_EXTENSIONS.contains(&ext) {
            tags.insert(topics::CONFIG.to_string());
        }
        if DOC_EXTENSIONS.contains(&ext) || path.starts_with("docs/") {
            tags.insert(topics::DOCS.to_string());
        }
        if SOURCE_EXTENSIONS.contains(&ext) && !tags.contains(topics::TESTS) {
            tags.insert(topics::SOURCE.to_string());
        }
        tags
    }
}

fn is_test_path(path: &str, file_name: &str) -> bool {
    path.split('/')
        .any(|segment| segment == "tests" || segment == "test" || segment == "__tests__")
        || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}

fn declares_public_item(change: &FileChange) -> bool {
    change.changed_lines().any(|line| {
        let line = line.trim_start();
        DECLARATION_PREFIXES.iter().any(|p| line.starts_with(p))
    })
}

impl ChangeClassifier for HeuristicClassifier {
    fn classify(&self, change: &FileChange) -> FileClassification {
        let mut tags = Self::path_topics(&change.path);
        let ignored = self.ignored.is_match(&change.path);
        if ignored {
            tags.remove(topics::SOURCE);
            return FileClassification {
                ignored,
                topics: tags,
                ..Default::default()
            };
        }

        let interface_path = self.public_interface.is_match(&change.path)
            || change
                .old_path
                .as_deref()
                .is_some_and(|p| self.public_interface.is_match(p));
        let structural = change.kind != ChangeKind::Modified || change.lines_touched() > 0;
        let public_interface = (interface_path && structural) || declares_public_item(change);
        if public_interface {
            tags.insert(topics::API.to_string());
        }

        FileClassification {
            ignored,
            doc_relevant: self.doc_relevant.is_match(&change.path),
            public_interface,
            topics: tags,
        }
    }
}

/// Derives a [`ChangeSignal`] from a [`ChangeSet`].
#[derive(Clone)]
pub struct ChangeAnalyzer {
    classifier: Arc<dyn ChangeClassifier>,
    always_document: PathMatcher,
    threshold: f64,
}

impl std::fmt::Debug for ChangeAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeAnalyzer")
            .field("always_document", &self.always_document.patterns())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl ChangeAnalyzer {
    /// Analyzer with the heuristic classifier built from `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            classifier: Arc::new(HeuristicClassifier::from_config(config)?),
            always_document: PathMatcher::new(&config.always_document_paths)?,
            threshold: config.relevance_threshold,
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ChangeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn analyze(&self, change_set: &ChangeSet) -> ChangeSignal {
        let entries = change_set.entries();
        if entries.is_empty() {
            return ChangeSignal {
                relevance: 0.0,
                topics: BTreeSet::new(),
                summary: String::new(),
                requires_doc_update: false,
                changed_paths: Vec::new(),
                always_document_hits: Vec::new(),
            };
        }

        let mut doc_relevant = 0usize;
        let mut counted_lines = 0usize;
        let mut interface_change = false;
        let mut topic_set = BTreeSet::new();
        let mut hits = Vec::new();

        for change in entries {
            let verdict = self.classifier.classify(change);
            topic_set.extend(
                verdict
                    .topics
                    .into_iter()
                    .filter(|t| topics::ALL.contains(&t.as_str())),
            );
            match change.kind {
                ChangeKind::Added => topic_set.insert(topics::ADDED_FILES.to_string()),
                ChangeKind::Deleted => topic_set.insert(topics::REMOVED_FILES.to_string()),
                ChangeKind::Renamed => topic_set.insert(topics::RENAMED_FILES.to_string()),
                ChangeKind::Modified => false,
            };
            if self.hits_always_document(change) {
                hits.push(change.path.clone());
            }
            if verdict.ignored {
                continue;
            }
            if verdict.doc_relevant {
                doc_relevant += 1;
            }
            interface_change |= verdict.public_interface;
            counted_lines += change.lines_touched();
        }

        // Ignored files still count toward the file total.
        let files = entries.len() as f64;
        let magnitude = (counted_lines as f64 / MAGNITUDE_SATURATION).min(1.0);
        let relevance = (DOC_RELEVANT_WEIGHT * (doc_relevant as f64 / files)
            + MAGNITUDE_WEIGHT * magnitude
            + if interface_change { INTERFACE_WEIGHT } else { 0.0 })
        .clamp(0.0, 1.0);

        ChangeSignal {
            relevance,
            topics: topic_set,
            summary: summarize(change_set),
            requires_doc_update: relevance >= self.threshold || !hits.is_empty(),
            changed_paths: entries.iter().map(|c| c.path.clone()).collect(),
            always_document_hits: hits,
        }
    }

    fn hits_always_document(&self, change: &FileChange) -> bool {
        self.always_document.is_match(&change.path)
            || change
                .old_path
                .as_deref()
                .is_some_and(|p| self.always_document.is_match(p))
    }
}

/// `"N file(s) changed (+A/-R): kind path; ..."`, empty for an empty set.
pub fn summarize(change_set: &ChangeSet) -> String {
    let entries = change_set.entries();
    if entries.is_empty() {
        return String::new();
    }

    let added: usize = entries.iter().map(FileChange::lines_added).sum();
    let removed: usize = entries.iter().map(FileChange::lines_removed).sum();
    let noun = if entries.len() == 1 { "file" } else { "files" };

    let mut items: Vec<String> = entries
        .iter()
        .take(SUMMARY_MAX_FILES)
        .map(|c| match (&c.kind, &c.old_path) {
            (ChangeKind::Renamed, Some(old)) => format!("renamed {old} -> {}", c.path),
            (kind, _) => format!("{} {}", kind.as_str(), c.path),
        })
        .collect();
    if entries.len() > SUMMARY_MAX_FILES {
        items.push(format!("and {} more", entries.len() - SUMMARY_MAX_FILES));
    }

    format!(
        "{} {noun} changed (+{added}/-{removed}): {}",
        entries.len(),
        items.join("; ")
    )
}
