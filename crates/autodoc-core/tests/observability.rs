//! Lifecycle events emitted while a run executes.

use std::sync::Arc;

use autodoc_core::fakes::{CannedProvider, ScriptedDiffSource};
use autodoc_core::obs::{emit_run_archive_error, emit_stage_retry};
use autodoc_core::{
    ChangeRequest, Credential, Orchestrator, PipelineConfig, PipelineError, ProviderKind, RunStage,
};
use autodoc_state::fakes::MemoryDocumentStore;
use tracing_test::traced_test;

const DIFF: &str = "\
diff --git a/api/users.py b/api/users.py
--- a/api/users.py
+++ b/api/users.py
@@ -1 +1 @@
-def get(id):
+def get(id, fields=None):
";

fn orchestrator(source: ScriptedDiffSource) -> Orchestrator {
    Orchestrator::builder(PipelineConfig::default())
        .diff_source(Arc::new(source))
        .provider(Arc::new(CannedProvider::new(ProviderKind::Primary, "# Doc\n")))
        .document_store(Arc::new(MemoryDocumentStore::new()))
        .build()
        .unwrap()
}

#[traced_test]
#[tokio::test]
async fn completed_run_emits_lifecycle_events() {
    let run = orchestrator(ScriptedDiffSource::always(DIFF))
        .run(ChangeRequest::commit(
            "acme/api",
            "abc123",
            Credential::new("ghp_secret"),
        ))
        .await;

    assert_eq!(run.stage(), RunStage::Done);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("stage.entered"));
    assert!(logs_contain("decision.made"));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain(&run.run_id().to_string()));
    assert!(!logs_contain("ghp_secret"));
}

#[traced_test]
#[tokio::test(start_paused = true)]
async fn retries_are_logged() {
    let source = ScriptedDiffSource::new(vec![Err(PipelineError::TransientFetchError(
        "connection reset".into(),
    ))])
    .then(DIFF);
    let run = orchestrator(source)
        .run(ChangeRequest::pull_request("acme/api", 3, Credential::anonymous()))
        .await;

    assert_eq!(run.stage(), RunStage::Done);
    assert!(logs_contain("stage.retry"));
    assert!(logs_contain("connection reset"));
}

#[traced_test]
#[test]
fn stage_retry_event_is_a_warning() {
    emit_stage_retry(
        RunStage::Saving,
        1,
        std::time::Duration::from_millis(500),
        &PipelineError::PersistUnavailable("503".into()),
    );
    assert!(logs_contain("WARN"));
    assert!(logs_contain("delay_ms=500"));
}

#[traced_test]
#[test]
fn archive_error_event_is_emitted() {
    emit_run_archive_error("run-1", &"disk full");
    assert!(logs_contain("run.archive_error"));
}
