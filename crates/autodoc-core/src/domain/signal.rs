//! Analyzer output and decider output.

use std::collections::BTreeSet;

use autodoc_state::ContentDigest;
use serde::{Deserialize, Serialize};

/// Documentation relevance derived from a change set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSignal {
    /// Relevance score in `[0.0, 1.0]`.
    pub relevance: f64,
    /// Affected-topic tags from the closed taxonomy.
    pub topics: BTreeSet<String>,
    /// Human-readable description of the change, empty for an empty change set.
    pub summary: String,
    pub requires_doc_update: bool,
    /// Changed paths, in change-set order.
    pub changed_paths: Vec<String>,
    /// Changed paths that matched an always-document pattern.
    pub always_document_hits: Vec<String>,
}

impl ChangeSignal {
    /// Whether the summary carries anything a generator could work from.
    pub fn has_usable_summary(&self) -> bool {
        self.summary.chars().any(char::is_alphanumeric)
    }

    /// Content hash over every field, stable across runs.
    pub fn digest(&self) -> ContentDigest {
        let relevance = self.relevance.to_bits().to_string();
        let topics = join(self.topics.iter());
        let flag = if self.requires_doc_update { "1" } else { "0" };
        let paths = join(self.changed_paths.iter());
        let hits = join(self.always_document_hits.iter());
        ContentDigest::from_parts(&[
            relevance.as_bytes(),
            topics.as_bytes(),
            self.summary.as_bytes(),
            flag.as_bytes(),
            paths.as_bytes(),
            hits.as_bytes(),
        ])
    }
}

fn join<'a>(items: impl Iterator<Item = &'a String>) -> String {
    items.map(String::as_str).collect::<Vec<_>>().join("\n")
}

/// What the pipeline should do with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionAction {
    Generate,
    Skip,
    Defer,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Generate => "GENERATE",
            DecisionAction::Skip => "SKIP",
            DecisionAction::Defer => "DEFER",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decider verdict with an audit rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(summary: &str) -> ChangeSignal {
        ChangeSignal {
            relevance: 0.7,
            topics: ["api".to_string()].into_iter().collect(),
            summary: summary.to_string(),
            requires_doc_update: true,
            changed_paths: vec!["api/users.py".to_string()],
            always_document_hits: vec![],
        }
    }

    #[test]
    fn usable_summary_needs_alphanumerics() {
        assert!(signal("1 file changed").has_usable_summary());
        assert!(!signal("").has_usable_summary());
        assert!(!signal("   \n").has_usable_summary());
        assert!(!signal("-- ; --").has_usable_summary());
    }

    #[test]
    fn digest_tracks_content() {
        let a = signal("1 file changed");
        let mut b = a.clone();
        assert_eq!(a.digest(), b.digest());
        b.relevance = 0.71;
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn decision_action_serializes_uppercase() {
        let json = serde_json::to_string(&DecisionAction::Generate).unwrap();
        assert_eq!(json, "\"GENERATE\"");
    }
}
