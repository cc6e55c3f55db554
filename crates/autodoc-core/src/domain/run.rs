//! Pipeline run lifecycle.
//!
//! A `PipelineRun` is created in `Loading` and only moves forward:
//!
//! ```text
//! Loading -> Analyzing -> Deciding -> Generating -> Saving -> Done
//!                                  \-> Skipped
//!                                  \-> Deferred
//! (any non-terminal stage) -> Failed
//! ```
//!
//! Stage outputs can only be attached through the transition methods, each
//! of which checks the current stage, so every field is written at most once.

use autodoc_state::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::ChangeSet;
use super::draft::{DraftDocument, SaveResult};
use super::request::ChangeRequest;
use super::signal::{ChangeSignal, Decision, DecisionAction};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::generator::ProviderKind;

/// Current position of a run in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Loading,
    Analyzing,
    Deciding,
    Generating,
    Saving,
    Done,
    Skipped,
    Deferred,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Loading => "loading",
            RunStage::Analyzing => "analyzing",
            RunStage::Deciding => "deciding",
            RunStage::Generating => "generating",
            RunStage::Saving => "saving",
            RunStage::Done => "done",
            RunStage::Skipped => "skipped",
            RunStage::Deferred => "deferred",
            RunStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStage::Done | RunStage::Skipped | RunStage::Deferred | RunStage::Failed
        )
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit entry for one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: RunStage,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// The error that ended a failed run.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: RunStage,
    pub attempts: u32,
    pub error: PipelineError,
}

/// Aggregate state of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    run_id: RunId,
    request: ChangeRequest,
    stage: RunStage,
    change_set: Option<ChangeSet>,
    signal: Option<ChangeSignal>,
    decision: Option<Decision>,
    draft: Option<DraftDocument>,
    save_result: Option<SaveResult>,
    failure: Option<StageFailure>,
    stage_log: Vec<StageRecord>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(request: ChangeRequest) -> Self {
        Self {
            run_id: RunId::new(),
            request,
            stage: RunStage::Loading,
            change_set: None,
            signal: None,
            decision: None,
            draft: None,
            save_result: None,
            failure: None,
            stage_log: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn request(&self) -> &ChangeRequest {
        &self.request
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn change_set(&self) -> Option<&ChangeSet> {
        self.change_set.as_ref()
    }

    pub fn signal(&self) -> Option<&ChangeSignal> {
        self.signal.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn draft(&self) -> Option<&DraftDocument> {
        self.draft.as_ref()
    }

    pub fn save_result(&self) -> Option<&SaveResult> {
        self.save_result.as_ref()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn stage_log(&self) -> &[StageRecord] {
        &self.stage_log
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub(crate) fn record_loaded(&mut self, change_set: ChangeSet) -> Result<()> {
        self.transition(RunStage::Loading, RunStage::Analyzing)?;
        self.change_set = Some(change_set);
        Ok(())
    }

    pub(crate) fn record_analyzed(&mut self, signal: ChangeSignal) -> Result<()> {
        self.transition(RunStage::Analyzing, RunStage::Deciding)?;
        self.signal = Some(signal);
        Ok(())
    }

    pub(crate) fn record_decided(&mut self, decision: Decision) -> Result<()> {
        let next = match decision.action {
            DecisionAction::Generate => RunStage::Generating,
            DecisionAction::Skip => RunStage::Skipped,
            DecisionAction::Defer => RunStage::Deferred,
        };
        self.transition(RunStage::Deciding, next)?;
        self.decision = Some(decision);
        Ok(())
    }

    pub(crate) fn record_generated(&mut self, draft: DraftDocument) -> Result<()> {
        self.transition(RunStage::Generating, RunStage::Saving)?;
        self.draft = Some(draft);
        Ok(())
    }

    pub(crate) fn record_saved(&mut self, result: SaveResult) -> Result<()> {
        self.transition(RunStage::Saving, RunStage::Done)?;
        self.save_result = Some(result);
        Ok(())
    }

    /// Move a non-terminal run to `Failed`, keeping the originating error.
    pub(crate) fn record_failure(&mut self, error: PipelineError, attempts: u32) -> Result<()> {
        let stage = self.stage;
        self.transition(stage, RunStage::Failed)?;
        if stage == RunStage::Saving {
            self.save_result = Some(SaveResult::failed(&error));
        }
        self.failure = Some(StageFailure {
            stage,
            attempts,
            error,
        });
        Ok(())
    }

    /// Log a stage. Only the stage the run is currently in can be logged.
    pub(crate) fn push_stage_record(&mut self, record: StageRecord) -> Result<()> {
        if record.stage != self.stage {
            return Err(PipelineError::InvalidTransition {
                from: self.stage.to_string(),
                to: record.stage.to_string(),
            });
        }
        self.stage_log.push(record);
        Ok(())
    }

    fn transition(&mut self, expected: RunStage, next: RunStage) -> Result<()> {
        if self.stage != expected || self.stage.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminal-state summary handed back to the trigger.
    pub fn report(&self) -> RunReport {
        let duration_ms = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64;

        RunReport {
            run_id: self.run_id.to_string(),
            repository: self.request.repository().to_string(),
            reference: self.request.reference().to_string(),
            state: self.stage,
            action: self.decision.as_ref().map(|d| d.action),
            rationale: self.decision.as_ref().map(|d| d.rationale.clone()),
            relevance: self.signal.as_ref().map(|s| s.relevance),
            files_changed: self.change_set.as_ref().map(ChangeSet::len),
            provider: self.draft.as_ref().map(|d| d.provider),
            document: self.save_result.as_ref().and_then(|s| s.location.clone()),
            error: self.failure.as_ref().map(|f| ErrorReport {
                kind: f.error.kind(),
                stage: f.stage,
                attempts: f.attempts,
                chain: f.error.chain(),
            }),
            stages: self.stage_log.clone(),
            duration_ms,
        }
    }
}

/// Serializable error detail of a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub stage: RunStage,
    pub attempts: u32,
    /// Error messages, outermost first.
    pub chain: Vec<String>,
}

/// Terminal-state summary: action taken, rationale, any error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub repository: String,
    pub reference: String,
    pub state: RunStage,
    pub action: Option<DecisionAction>,
    pub rationale: Option<String>,
    pub relevance: Option<f64>,
    pub files_changed: Option<usize>,
    pub provider: Option<ProviderKind>,
    pub document: Option<String>,
    pub error: Option<ErrorReport>,
    pub stages: Vec<StageRecord>,
    pub duration_ms: u64,
}
