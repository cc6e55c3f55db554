//! Path glob matching for configuration patterns.
//!
//! Patterns use `globset` syntax with `*` and `?` confined to one path
//! segment: `**` crosses segments, `{a,b}` gives alternatives and `[ab]` /
//! `[!x]` are character classes.
//!
//! A pattern without a `/` matches the file name at any depth, so `*.md`
//! matches both `README.md` and `docs/guide.md`.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{PipelineError, Result};

/// Compiled set of glob patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PathMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(&anchored(pattern))
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    PipelineError::InvalidConfiguration(format!("path pattern '{pattern}': {e}"))
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| {
            PipelineError::InvalidConfiguration(format!("invalid path patterns: {e}"))
        })?;
        Ok(Self { patterns, set })
    }

    /// A matcher that matches nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path.trim_start_matches("./"))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Strip leading `./` or `/`; basename patterns get a `**/` prefix.
fn anchored(pattern: &str) -> String {
    let body = pattern.trim_start_matches("./").trim_start_matches('/');
    if body.contains('/') {
        body.to_string()
    } else {
        format!("**/{body}")
    }
}
