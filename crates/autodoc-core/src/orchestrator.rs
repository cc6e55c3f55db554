//! Pipeline orchestration.
//!
//! Drives one [`PipelineRun`] through
//! load → analyze → decide → {generate → save}, applying the retry policy
//! and per-stage timeout to the network-bound stages. A run always ends in
//! a terminal state; errors are recorded on the run, never returned.

use std::sync::Arc;
use std::time::Instant;

use autodoc_state::{ArchivedRun, DocumentStore, RunArchive};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{warn, Instrument};

use crate::analyzer::{ChangeAnalyzer, ChangeClassifier};
use crate::config::PipelineConfig;
use crate::decider::DocumentDecider;
use crate::domain::{ChangeRequest, Decision, DecisionAction, PipelineRun, RunStage, StageRecord};
use crate::error::{PipelineError, ProviderError, Result};
use crate::generator::{
    CompletionCache, CompletionProvider, DocumentGenerator, ProviderKind, ProviderRegistry,
};
use crate::loader::{ChangeLoader, DiffSource};
use crate::obs;
use crate::retry::{retry_stage, Attempted, RetryPolicy};
use crate::saver::DocumentSaver;

/// Outcome of the decider, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    Skipped(Decision),
    Deferred(Decision),
    Proceeding(Decision),
}

impl Branch {
    pub fn decision(&self) -> &Decision {
        match self {
            Branch::Skipped(d) | Branch::Deferred(d) | Branch::Proceeding(d) => d,
        }
    }
}

impl From<Decision> for Branch {
    fn from(decision: Decision) -> Self {
        match decision.action {
            DecisionAction::Skip => Branch::Skipped(decision),
            DecisionAction::Defer => Branch::Deferred(decision),
            DecisionAction::Generate => Branch::Proceeding(decision),
        }
    }
}

/// Error that ended a stage, with the attempts spent on it.
struct StageError {
    error: PipelineError,
    attempts: u32,
}

impl From<PipelineError> for StageError {
    fn from(error: PipelineError) -> Self {
        Self { error, attempts: 1 }
    }
}

/// Builder for [`Orchestrator`]. Validation happens in [`build`](Self::build).
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    source: Option<Arc<dyn DiffSource>>,
    registry: ProviderRegistry,
    store: Option<Arc<dyn DocumentStore>>,
    archive: Option<Arc<dyn RunArchive>>,
    classifier: Option<Arc<dyn ChangeClassifier>>,
    cache: Option<Arc<CompletionCache>>,
}

impl OrchestratorBuilder {
    pub fn diff_source(mut self, source: Arc<dyn DiffSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.registry.register(provider);
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn run_archive(mut self, archive: Arc<dyn RunArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ChangeClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn completion_cache(mut self, cache: Arc<CompletionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and resolve the provider.
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let source = self.source.ok_or_else(|| {
            PipelineError::InvalidConfiguration("no diff source configured".into())
        })?;
        let store = self.store.ok_or_else(|| {
            PipelineError::InvalidConfiguration("no document store configured".into())
        })?;

        let mut analyzer = ChangeAnalyzer::from_config(&self.config)?;
        if let Some(classifier) = self.classifier {
            analyzer = analyzer.with_classifier(classifier);
        }
        let mut generator = DocumentGenerator::from_config(&self.config, &self.registry)?;
        if let Some(cache) = self.cache {
            generator = generator.with_cache(cache);
        }

        Ok(Orchestrator {
            loader: ChangeLoader::new(source),
            decider: DocumentDecider::new(self.config.relevance_threshold),
            saver: DocumentSaver::new(store),
            retry: RetryPolicy::from_config(&self.config),
            archive: self.archive,
            analyzer,
            generator,
            config: self.config,
        })
    }
}

/// Runs change requests through the documentation pipeline.
pub struct Orchestrator {
    config: PipelineConfig,
    loader: ChangeLoader,
    analyzer: ChangeAnalyzer,
    decider: DocumentDecider,
    generator: DocumentGenerator,
    saver: DocumentSaver,
    retry: RetryPolicy,
    archive: Option<Arc<dyn RunArchive>>,
}

impl Orchestrator {
    pub fn builder(config: PipelineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            source: None,
            registry: ProviderRegistry::new(),
            store: None,
            archive: None,
            classifier: None,
            cache: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.generator.provider_kind()
    }

    /// Execute one run to a terminal state.
    pub async fn run(&self, request: ChangeRequest) -> PipelineRun {
        let mut run = PipelineRun::new(request);
        let run_id = run.run_id().to_string();

        async {
            obs::emit_run_started(
                &run_id,
                &run.request().to_string(),
                self.generator.provider_kind().as_str(),
            );

            if let Err(StageError { error, attempts }) = self.drive(&mut run).await {
                if let Err(guard) = run.record_failure(error, attempts) {
                    warn!(error = %guard, "could not record stage failure");
                }
            }

            obs::emit_run_finished(
                &run_id,
                run.stage(),
                run.report().duration_ms,
                run.failure().map(|f| &f.error),
            );
            self.archive_run(&run).await;
        }
        .instrument(obs::run_span(&run_id))
        .await;

        run
    }

    /// Execute independent runs concurrently. Output order matches input.
    pub async fn run_many(&self, requests: Vec<ChangeRequest>) -> Vec<PipelineRun> {
        join_all(requests.into_iter().map(|r| self.run(r))).await
    }

    async fn drive(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let timeout = self.config.per_stage_timeout();
        let timeout_secs = timeout.as_secs();

        // Loading
        let request = run.request().clone();
        let request = &request;
        let clock = StageClock::start();
        let loaded = retry_stage(
            &self.retry,
            RunStage::Loading,
            timeout,
            || PipelineError::TransientFetchError(format!("load timed out after {timeout_secs}s")),
            move || self.loader.load(request),
        )
        .await;
        let change_set = finish_stage(run, RunStage::Loading, clock, loaded)?;
        run.record_loaded(change_set.clone())?;

        // Analyzing
        let clock = StageClock::start();
        obs::emit_stage_entered(RunStage::Analyzing, 1);
        let signal = self.analyzer.analyze(&change_set);
        run.push_stage_record(clock.finish(RunStage::Analyzing, 1, None))?;
        run.record_analyzed(signal.clone())?;

        // Deciding
        let clock = StageClock::start();
        obs::emit_stage_entered(RunStage::Deciding, 1);
        let decision = self.decider.decide(&signal);
        obs::emit_decision_made(&decision, signal.relevance);
        let branch = Branch::from(decision.clone());
        run.push_stage_record(clock.finish(RunStage::Deciding, 1, None))?;
        run.record_decided(decision)?;

        if !matches!(branch, Branch::Proceeding(_)) {
            return Ok(());
        }

        // Generating
        let target_path = self.config.target_document.as_str();
        let provider = self.generator.provider_kind();
        let signal = &signal;
        let clock = StageClock::start();
        let generated = retry_stage(
            &self.retry,
            RunStage::Generating,
            timeout,
            || {
                PipelineError::generation(
                    provider.as_str(),
                    ProviderError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                )
            },
            move || async move {
                let target = self.saver.read_target(target_path).await?;
                self.generator.generate(signal, &target).await
            },
        )
        .await;
        let draft = finish_stage(run, RunStage::Generating, clock, generated)?;
        run.record_generated(draft.clone())?;

        // Saving
        let draft = &draft;
        let clock = StageClock::start();
        let saved = retry_stage(
            &self.retry,
            RunStage::Saving,
            timeout,
            || PipelineError::PersistUnavailable(format!("save timed out after {timeout_secs}s")),
            move || self.saver.save(draft),
        )
        .await;
        let result = finish_stage(run, RunStage::Saving, clock, saved)?;
        run.record_saved(result)?;
        Ok(())
    }

    async fn archive_run(&self, run: &PipelineRun) {
        let Some(archive) = &self.archive else {
            return;
        };
        let run_id = run.run_id().to_string();
        let report = match serde_json::to_value(run.report()) {
            Ok(report) => report,
            Err(err) => {
                obs::emit_run_archive_error(&run_id, &err);
                return;
            }
        };
        let archived = ArchivedRun {
            run_id: run.run_id().clone(),
            terminal_state: run.stage().as_str().to_string(),
            report,
            archived_at: Utc::now(),
        };
        if let Err(err) = archive.archive(archived).await {
            obs::emit_run_archive_error(&run_id, &err);
        }
    }
}

/// Wall-clock start for the stage log plus a monotonic start for durations.
struct StageClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StageClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn finish(self, stage: RunStage, attempts: u32, error: Option<String>) -> StageRecord {
        StageRecord {
            stage,
            started_at: self.started_at,
            attempts,
            duration_ms: self.started.elapsed().as_millis() as u64,
            error,
        }
    }
}

fn finish_stage<T>(
    run: &mut PipelineRun,
    stage: RunStage,
    clock: StageClock,
    outcome: Attempted<T>,
) -> std::result::Result<T, StageError> {
    let Attempted { result, attempts } = outcome;
    let error = result.as_ref().err().map(ToString::to_string);
    run.push_stage_record(clock.finish(stage, attempts, error))?;
    result.map_err(|error| StageError { error, attempts })
}
