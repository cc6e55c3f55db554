//! Webhook payload adapter.
//!
//! Maps GitHub repository events onto [`ChangeRequest`]s. The credential is
//! supplied by the caller; payloads never carry one.

use serde::Deserialize;

use crate::domain::{ChangeRequest, Credential};

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("unsupported webhook event '{0}'")]
    UnsupportedEvent(String),

    #[error("malformed {event} payload: {detail}")]
    MalformedPayload { event: String, detail: String },
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    repository: Repository,
    after: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    repository: Repository,
    number: u64,
    #[serde(default)]
    action: Option<String>,
}

/// Pull request actions that change the diff.
const PR_ACTIONS: &[&str] = &["opened", "reopened", "synchronize", "ready_for_review"];

/// Derive change requests from a webhook delivery.
///
/// `event` is the `X-GitHub-Event` header value. Deliveries that describe no
/// new change (branch deletion, closed pull requests, `ping`) yield nothing.
pub fn requests_from_webhook(
    event: &str,
    payload: &[u8],
    credential: &Credential,
) -> Result<Vec<ChangeRequest>, TriggerError> {
    let malformed = |e: serde_json::Error| TriggerError::MalformedPayload {
        event: event.to_string(),
        detail: e.to_string(),
    };

    match event {
        "push" => {
            let push: PushPayload = serde_json::from_slice(payload).map_err(malformed)?;
            if push.after.is_empty() || push.after.chars().all(|c| c == '0') {
                return Ok(Vec::new());
            }
            Ok(vec![ChangeRequest::commit(
                push.repository.full_name,
                push.after,
                credential.clone(),
            )])
        }
        "pull_request" => {
            let pr: PullRequestPayload = serde_json::from_slice(payload).map_err(malformed)?;
            let relevant = pr
                .action
                .as_deref()
                .map_or(true, |a| PR_ACTIONS.contains(&a));
            if !relevant {
                return Ok(Vec::new());
            }
            Ok(vec![ChangeRequest::pull_request(
                pr.repository.full_name,
                pr.number,
                credential.clone(),
            )])
        }
        "ping" => Ok(Vec::new()),
        other => Err(TriggerError::UnsupportedEvent(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeRef;
    use serde_json::json;

    fn bytes(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn push_maps_to_commit_request() {
        let payload = bytes(json!({
            "ref": "refs/heads/main",
            "after": "9f8e7d6c5b4a",
            "repository": { "full_name": "acme/api", "private": true }
        }));
        let reqs = requests_from_webhook("push", &payload, &Credential::new("tok")).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].repository(), "acme/api");
        assert_eq!(reqs[0].reference(), &ChangeRef::Commit("9f8e7d6c5b4a".into()));
        assert_eq!(reqs[0].credential().expose_secret(), "tok");
    }

    #[test]
    fn branch_deletion_yields_nothing() {
        let payload = bytes(json!({
            "after": "0000000000000000000000000000000000000000",
            "repository": { "full_name": "acme/api" }
        }));
        let reqs = requests_from_webhook("push", &payload, &Credential::anonymous()).unwrap();
        assert!(reqs.is_empty());
    }

    #[test]
    fn pull_request_maps_to_pr_request() {
        let payload = bytes(json!({
            "action": "synchronize",
            "number": 42,
            "repository": { "full_name": "acme/api" }
        }));
        let reqs =
            requests_from_webhook("pull_request", &payload, &Credential::anonymous()).unwrap();
        assert_eq!(reqs[0].reference(), &ChangeRef::PullRequest(42));
    }

    #[test]
    fn closed_pull_request_yields_nothing() {
        let payload = bytes(json!({
            "action": "closed",
            "number": 42,
            "repository": { "full_name": "acme/api" }
        }));
        assert!(requests_from_webhook("pull_request", &payload, &Credential::anonymous())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = requests_from_webhook("issues", b"{}", &Credential::anonymous()).unwrap_err();
        assert!(matches!(err, TriggerError::UnsupportedEvent(e) if e == "issues"));
    }

    #[test]
    fn malformed_payload_is_reported() {
        let err = requests_from_webhook("push", b"{\"after\": 1}", &Credential::anonymous())
            .unwrap_err();
        assert!(matches!(err, TriggerError::MalformedPayload { .. }));
    }
}
