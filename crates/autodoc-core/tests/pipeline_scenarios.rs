//! End-to-end pipeline scenarios over in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autodoc_core::fakes::{CannedProvider, FlakyDocumentStore, ScriptedDiffSource};
use autodoc_core::{
    ChangeRequest, CompletionOptions, CompletionProvider, Credential, DecisionAction, ErrorKind,
    Orchestrator, PipelineConfig, PipelineError, ProviderError, ProviderKind, RunStage,
};
use autodoc_state::fakes::{MemoryDocumentStore, MemoryRunArchive};
use autodoc_state::{DocumentStore, RunArchive};

const TEST_ONLY_DIFF: &str = "\
diff --git a/tests/unit_test.py b/tests/unit_test.py
index 1111111..2222222 100644
--- a/tests/unit_test.py
+++ b/tests/unit_test.py
@@ -1,2 +1,3 @@
 def test_add():
-    assert add(1, 2) == 3
+    assert add(1, 2) == 3
+    assert add(0, 0) == 0
";

const PUBLIC_INTERFACE_DIFF: &str = "\
diff --git a/api/public_interface.py b/api/public_interface.py
index 1111111..2222222 100644
--- a/api/public_interface.py
+++ b/api/public_interface.py
@@ -1,2 +1,2 @@
-def get_user(user_id):
+def get_user(user_id, include_profile=False):
     return db.fetch(user_id)
";

const GENERATED: &str = "# Changes\n\n`get_user` accepts `include_profile`.\n";

fn request() -> ChangeRequest {
    ChangeRequest::commit("acme/api", "5d41402abc4b2a76", Credential::new("ghp_token"))
}

struct Harness {
    source: Arc<ScriptedDiffSource>,
    provider: Arc<CannedProvider>,
    store: Arc<MemoryDocumentStore>,
    archive: Arc<MemoryRunArchive>,
    orchestrator: Orchestrator,
}

fn harness(config: PipelineConfig, source: ScriptedDiffSource, provider: CannedProvider) -> Harness {
    let source = Arc::new(source);
    let provider = Arc::new(provider);
    let store = Arc::new(MemoryDocumentStore::new());
    let archive = Arc::new(MemoryRunArchive::new());
    let orchestrator = Orchestrator::builder(config)
        .diff_source(source.clone())
        .provider(provider.clone())
        .document_store(store.clone())
        .run_archive(archive.clone())
        .build()
        .expect("valid orchestrator");
    Harness {
        source,
        provider,
        store,
        archive,
        orchestrator,
    }
}

fn primary(text: &str) -> CannedProvider {
    CannedProvider::new(ProviderKind::Primary, text)
}

#[tokio::test]
async fn test_only_commit_is_skipped_without_generation() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(TEST_ONLY_DIFF),
        primary(GENERATED),
    );

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Skipped);
    let signal = run.signal().unwrap();
    assert!(signal.relevance < 0.5);
    assert!(!signal.requires_doc_update);
    assert_eq!(run.decision().unwrap().action, DecisionAction::Skip);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.store.artifact_count(), 0);
    assert!(run.draft().is_none());
    assert!(run.save_result().is_none());
}

#[tokio::test]
async fn always_document_path_generates_and_saves() {
    let cfg = PipelineConfig {
        relevance_threshold: 0.95,
        ..Default::default()
    };
    let h = harness(cfg, ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF), primary(GENERATED));

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Done);
    let signal = run.signal().unwrap();
    assert!(signal.relevance < 0.95);
    assert_eq!(signal.always_document_hits, vec!["api/public_interface.py"]);
    assert_eq!(run.decision().unwrap().action, DecisionAction::Generate);

    let draft = run.draft().unwrap();
    assert_eq!(draft.content, GENERATED);
    assert_eq!(draft.target_path, "docs/CHANGES.md");
    assert_eq!(draft.provider, ProviderKind::Primary);

    let saved = run.save_result().unwrap();
    assert!(saved.success);
    assert_eq!(saved.location.as_deref(), Some("memory://docs/CHANGES.md"));
    assert_eq!(h.store.artifact_count(), 1);

    let prompt = h.provider.last_prompt().unwrap();
    assert!(prompt.contains("api/public_interface.py"));
    assert!(!prompt.contains("ghp_token"));
}

#[tokio::test(start_paused = true)]
async fn transient_fetch_errors_are_retried() {
    let source = ScriptedDiffSource::new(vec![
        Err(PipelineError::TransientFetchError("connection reset".into())),
        Err(PipelineError::TransientFetchError("connection reset".into())),
    ])
    .then(PUBLIC_INTERFACE_DIFF);
    let cfg = PipelineConfig {
        max_retries: 3,
        ..Default::default()
    };
    let h = harness(cfg, source, primary(GENERATED));

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Done);
    assert_eq!(h.source.calls(), 3);
    let loading = &run.stage_log()[0];
    assert_eq!(loading.stage, RunStage::Loading);
    assert_eq!(loading.attempts, 3);
    assert!(loading.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let source = ScriptedDiffSource::new(
        (0..10)
            .map(|_| Err(PipelineError::TransientFetchError("timeout".into())))
            .collect(),
    );
    let cfg = PipelineConfig {
        max_retries: 2,
        ..Default::default()
    };
    let h = harness(cfg, source, primary(GENERATED));

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    assert_eq!(h.source.calls(), 3);
    let failure = run.failure().unwrap();
    assert_eq!(failure.error.kind(), ErrorKind::TransientFetchError);
    assert_eq!(failure.attempts, 3);
}

#[tokio::test]
async fn source_unavailable_fails_without_retry() {
    let source = ScriptedDiffSource::new(vec![Err(PipelineError::SourceUnavailable(
        "no commit found for SHA".into(),
    ))])
    .then(PUBLIC_INTERFACE_DIFF);
    let h = harness(PipelineConfig::default(), source, primary(GENERATED));

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    assert_eq!(h.source.calls(), 1);
    let report = run.report();
    let error = report.error.unwrap();
    assert_eq!(error.kind, ErrorKind::SourceUnavailable);
    assert_eq!(error.stage, RunStage::Loading);
    assert_eq!(error.attempts, 1);
    assert!(error.chain[0].contains("no commit found"));
    assert!(run.change_set().is_none());
}

#[tokio::test]
async fn empty_change_set_is_skipped() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(""),
        primary(GENERATED),
    );
    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Skipped);
    assert!(run.change_set().unwrap().is_empty());
    assert!(!run.signal().unwrap().requires_doc_update);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn generation_errors_are_not_retried() {
    let cfg = PipelineConfig {
        max_retries: 5,
        ..Default::default()
    };
    let h = harness(
        cfg,
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF),
        CannedProvider::failing(ProviderKind::Primary, ProviderError::Quota("429".into())),
    );

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    assert_eq!(h.provider.calls(), 1);
    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, RunStage::Generating);
    assert_eq!(failure.error.kind(), ErrorKind::GenerationError);
    assert_eq!(failure.error.chain().len(), 2);
    assert_eq!(h.store.artifact_count(), 0);
}

#[tokio::test]
async fn empty_completion_fails_the_run() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF),
        primary("   "),
    );
    let run = h.orchestrator.run(request()).await;
    assert_eq!(run.stage(), RunStage::Failed);
    assert!(run.draft().is_none());
    assert_eq!(h.store.artifact_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out_as_generation_error() {
    let cfg = PipelineConfig {
        per_stage_timeout_secs: 5,
        ..Default::default()
    };
    let h = harness(
        cfg,
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF),
        primary(GENERATED).with_delay(Duration::from_secs(30)),
    );

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    match &run.failure().unwrap().error {
        PipelineError::GenerationError { source, .. } => {
            assert_eq!(source, &ProviderError::Timeout { timeout_ms: 5_000 })
        }
        other => panic!("expected GenerationError, got {other:?}"),
    }
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out_and_is_retried() {
    let cfg = PipelineConfig {
        per_stage_timeout_secs: 1,
        max_retries: 1,
        ..Default::default()
    };
    let h = harness(
        cfg,
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF).with_delay(Duration::from_secs(10)),
        primary(GENERATED),
    );

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    assert_eq!(h.source.calls(), 2);
    assert_eq!(
        run.failure().unwrap().error.kind(),
        ErrorKind::TransientFetchError
    );
}

#[tokio::test]
async fn unsupported_provider_fails_at_construction() {
    let provider = Arc::new(primary(GENERATED));
    let cfg = PipelineConfig {
        llm_provider: "gpt-4".into(),
        ..Default::default()
    };
    let err = Orchestrator::builder(cfg)
        .diff_source(Arc::new(ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF)))
        .provider(provider.clone())
        .document_store(Arc::new(MemoryDocumentStore::new()))
        .build()
        .err()
        .expect("build must fail");

    assert_eq!(err.kind(), ErrorKind::UnsupportedProvider);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn lost_save_acknowledgement_does_not_duplicate() {
    let inner = Arc::new(MemoryDocumentStore::new());
    let store = Arc::new(FlakyDocumentStore::losing_responses(inner.clone(), 1));
    let orchestrator = Orchestrator::builder(PipelineConfig::default())
        .diff_source(Arc::new(ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF)))
        .provider(Arc::new(primary(GENERATED)))
        .document_store(store.clone())
        .build()
        .unwrap();

    let run = orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Done);
    assert_eq!(store.write_calls(), 2);
    assert_eq!(inner.artifact_count(), 1);
    let saved = run.save_result().unwrap();
    assert!(saved.success);
    assert!(!saved.created);
}

#[tokio::test(start_paused = true)]
async fn persist_unavailable_exhausts_retries() {
    let inner = Arc::new(MemoryDocumentStore::new());
    let store = Arc::new(FlakyDocumentStore::new(inner.clone(), 100));
    let cfg = PipelineConfig {
        max_retries: 2,
        ..Default::default()
    };
    let orchestrator = Orchestrator::builder(cfg)
        .diff_source(Arc::new(ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF)))
        .provider(Arc::new(primary(GENERATED)))
        .document_store(store.clone())
        .build()
        .unwrap();

    let run = orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    assert_eq!(store.write_calls(), 3);
    let saved = run.save_result().unwrap();
    assert!(!saved.success);
    assert!(saved.error.as_deref().unwrap().contains("unavailable"));
    assert_eq!(inner.artifact_count(), 0);
}

/// Provider that edits the target document while "generating".
struct RacingProvider {
    store: Arc<MemoryDocumentStore>,
}

#[async_trait]
impl CompletionProvider for RacingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fast
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.store.seed("docs/CHANGES.md", "hand-edited meanwhile");
        Ok(GENERATED.to_string())
    }
}

#[tokio::test]
async fn concurrent_edit_is_a_persist_conflict() {
    let store = Arc::new(MemoryDocumentStore::new());
    store.seed("docs/CHANGES.md", "# Changes\n");
    let cfg = PipelineConfig {
        llm_provider: "fast".into(),
        ..Default::default()
    };
    let orchestrator = Orchestrator::builder(cfg)
        .diff_source(Arc::new(ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF)))
        .provider(Arc::new(RacingProvider {
            store: store.clone(),
        }))
        .document_store(store.clone())
        .build()
        .unwrap();

    let run = orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Failed);
    let failure = run.failure().unwrap();
    assert_eq!(failure.error.kind(), ErrorKind::PersistConflict);
    assert_eq!(failure.attempts, 1);
    let current = store.read("docs/CHANGES.md").await.unwrap().unwrap();
    assert_eq!(current.content, "hand-edited meanwhile");
}

#[tokio::test]
async fn existing_document_is_given_to_the_provider() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF),
        primary(GENERATED),
    );
    h.store.seed("docs/CHANGES.md", "# Changes\n\n- initial release\n");

    let run = h.orchestrator.run(request()).await;

    assert_eq!(run.stage(), RunStage::Done);
    assert!(h.provider.last_prompt().unwrap().contains("initial release"));
    assert!(run.draft().unwrap().base_revision.is_some());
}

#[tokio::test]
async fn runs_are_archived_with_their_report() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(TEST_ONLY_DIFF),
        primary(GENERATED),
    );
    let run = h.orchestrator.run(request()).await;

    let archived = h.archive.get(run.run_id()).await.unwrap();
    assert_eq!(archived.terminal_state, "skipped");
    assert_eq!(archived.report["action"], "SKIP");
    assert!(archived.report.get("credential").is_none());
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let h = harness(
        PipelineConfig::default(),
        ScriptedDiffSource::always(PUBLIC_INTERFACE_DIFF),
        primary(GENERATED),
    );
    let requests = vec![
        request(),
        ChangeRequest::pull_request("acme/api", 7, Credential::anonymous()),
        ChangeRequest::commit("acme/web", "ffff", Credential::anonymous())
            .with_path_filter("web/**"),
    ];

    let runs = h.orchestrator.run_many(requests).await;

    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.is_terminal()));
    assert_eq!(runs[0].stage(), RunStage::Done);
    assert_eq!(runs[1].stage(), RunStage::Done);
    assert_eq!(runs[2].stage(), RunStage::Skipped);
    assert_ne!(runs[0].run_id(), runs[1].run_id());
    // Same draft for both runs: the second save is a replay.
    assert_eq!(h.store.artifact_count(), 1);
    assert_eq!(h.archive.list().await.unwrap().len(), 3);
}
