//! Shared HTTP plumbing.

use std::time::Duration;

use autodoc_core::{PipelineError, ProviderError, Result};
use reqwest::StatusCode;

pub(crate) const USER_AGENT: &str = concat!("autodoc/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PipelineError::InvalidConfiguration(format!("http client: {e}")))
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Map a failed send/receive to a provider error.
pub(crate) fn provider_transport(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Map a non-success provider status to a provider error.
pub(crate) fn provider_status(status: StatusCode, message: &str) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::Quota(message.to_string()),
        _ => ProviderError::Transport(format!("HTTP {status}: {message}")),
    }
}
