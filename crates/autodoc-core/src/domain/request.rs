//! Change requests and the opaque credential they carry.

use serde::{Deserialize, Serialize};

/// Which change to load: a single commit or a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ChangeRef {
    Commit(String),
    PullRequest(u64),
}

impl std::fmt::Display for ChangeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeRef::Commit(sha) => {
                let short: String = sha.chars().take(12).collect();
                write!(f, "commit {short}")
            }
            ChangeRef::PullRequest(n) => write!(f, "pull request #{n}"),
        }
    }
}

/// Access credential supplied by the trigger.
///
/// Forwarded to the diff source as-is; the pipeline never inspects,
/// logs or serializes it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// A credential for sources that need none (local files, public repos).
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw secret, for transports only.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            f.write_str("Credential(<anonymous>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

/// Immutable description of the change a run should document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRequest {
    /// Repository reference, e.g. `owner/name`.
    repository: String,
    reference: ChangeRef,
    /// Optional glob restricting which changed files are considered.
    path_filter: Option<String>,
    #[serde(skip)]
    credential: Credential,
}

impl ChangeRequest {
    pub fn new(repository: impl Into<String>, reference: ChangeRef, credential: Credential) -> Self {
        Self {
            repository: repository.into(),
            reference,
            path_filter: None,
            credential,
        }
    }

    pub fn commit(repository: impl Into<String>, sha: impl Into<String>, credential: Credential) -> Self {
        Self::new(repository, ChangeRef::Commit(sha.into()), credential)
    }

    pub fn pull_request(repository: impl Into<String>, number: u64, credential: Credential) -> Self {
        Self::new(repository, ChangeRef::PullRequest(number), credential)
    }

    pub fn with_path_filter(mut self, filter: impl Into<String>) -> Self {
        self.path_filter = Some(filter.into());
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn reference(&self) -> &ChangeRef {
        &self.reference
    }

    pub fn path_filter(&self) -> Option<&str> {
        self.path_filter.as_deref()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

impl std::fmt::Display for ChangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.repository, self.reference)
    }
}
