//! GitHub REST diff source.

use async_trait::async_trait;
use autodoc_core::{ChangeRef, ChangeRequest, DiffSource, PipelineError, Result};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::StatusCode;
use tracing::debug;

use crate::http;

pub const GITHUB_API_BASE: &str = "https://api.github.com";

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const API_VERSION: &str = "2022-11-28";

/// Fetches unified diffs for commits and pull requests.
///
/// The request credential, when present, is sent as a bearer token.
#[derive(Debug, Clone)]
pub struct GitHubDiffSource {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubDiffSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(GITHUB_API_BASE)
    }

    /// Point at a GitHub Enterprise host or a test server.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http::client()?,
            base_url: http::trim_base(base_url),
        })
    }

    fn url_for(&self, request: &ChangeRequest) -> Result<String> {
        let repo = request.repository();
        let valid = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            return Err(PipelineError::SourceUnavailable(format!(
                "repository '{repo}' is not of the form owner/name"
            )));
        }
        Ok(match request.reference() {
            ChangeRef::Commit(sha) => format!("{}/repos/{repo}/commits/{sha}", self.base_url),
            ChangeRef::PullRequest(n) => format!("{}/repos/{repo}/pulls/{n}", self.base_url),
        })
    }
}

#[async_trait]
impl DiffSource for GitHubDiffSource {
    async fn fetch_diff(&self, request: &ChangeRequest) -> Result<Vec<u8>> {
        let url = self.url_for(request)?;
        debug!(%url, "fetching diff");

        let mut builder = self
            .client
            .get(&url)
            .header(ACCEPT, DIFF_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION);
        let credential = request.credential();
        if !credential.is_anonymous() {
            builder = builder.bearer_auth(credential.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::TransientFetchError(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let rate_limited = is_rate_limited(status, response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, rate_limited, &http::excerpt(&body), request));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::TransientFetchError(format!("reading diff body: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "github"
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    status == StatusCode::FORBIDDEN && (exhausted || headers.contains_key("retry-after"))
}

fn classify_status(
    status: StatusCode,
    rate_limited: bool,
    body: &str,
    request: &ChangeRequest,
) -> PipelineError {
    if rate_limited {
        return PipelineError::TransientFetchError(format!("rate limited (HTTP {status})"));
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return PipelineError::TransientFetchError(format!("HTTP {status}: {body}"));
    }
    match status {
        StatusCode::NOT_FOUND => PipelineError::SourceUnavailable(format!("{request} not found")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PipelineError::SourceUnavailable(
            format!("access to {} denied (HTTP {status})", request.repository()),
        ),
        _ => PipelineError::SourceUnavailable(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodoc_core::Credential;

    fn source() -> GitHubDiffSource {
        GitHubDiffSource::with_base_url("http://localhost:1/").unwrap()
    }

    #[test]
    fn urls_follow_reference_kind() {
        let commit = ChangeRequest::commit("acme/api", "abc123", Credential::anonymous());
        let pr = ChangeRequest::pull_request("acme/api", 7, Credential::anonymous());
        assert_eq!(
            source().url_for(&commit).unwrap(),
            "http://localhost:1/repos/acme/api/commits/abc123"
        );
        assert_eq!(
            source().url_for(&pr).unwrap(),
            "http://localhost:1/repos/acme/api/pulls/7"
        );
    }

    #[test]
    fn malformed_repository_is_unavailable() {
        for repo in ["acme", "/api", "acme/", "a/b/c"] {
            let req = ChangeRequest::commit(repo, "abc", Credential::anonymous());
            assert!(
                matches!(source().url_for(&req), Err(PipelineError::SourceUnavailable(_))),
                "{repo}"
            );
        }
    }

    #[test]
    fn forbidden_with_exhausted_quota_is_rate_limited() {
        let mut headers = HeaderMap::new();
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
        headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
        assert!(is_rate_limited(StatusCode::FORBIDDEN, &headers));
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()));
    }

    #[test]
    fn status_classification() {
        let req = ChangeRequest::commit("acme/api", "abc", Credential::anonymous());
        assert!(classify_status(StatusCode::BAD_GATEWAY, false, "", &req).is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, false, "", &req).is_retryable());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, false, "", &req).is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, false, "", &req).is_retryable());
        assert!(classify_status(StatusCode::FORBIDDEN, true, "", &req).is_retryable());
    }
}
