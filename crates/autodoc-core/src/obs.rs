//! Structured lifecycle events for pipeline runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Events emitted inside [`run_span`] inherit its `run_id`.

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{Decision, RunStage};
use crate::error::PipelineError;

/// Run-scoped span. Attach it to the run future with
/// [`tracing::Instrument::instrument`].
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("autodoc.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, request: &str, provider: &str) {
    info!(event = "run.started", run_id = %run_id, request = %request, provider = %provider);
}

pub fn emit_stage_entered(stage: RunStage, attempt: u32) {
    info!(event = "stage.entered", stage = %stage, attempt = attempt);
}

/// A retryable error is about to be re-attempted after `delay`.
pub fn emit_stage_retry(stage: RunStage, attempt: u32, delay: Duration, error: &PipelineError) {
    warn!(
        event = "stage.retry",
        stage = %stage,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error_kind = ?error.kind(),
        error = %error,
    );
}

pub fn emit_decision_made(decision: &Decision, relevance: f64) {
    info!(
        event = "decision.made",
        action = %decision.action,
        relevance = relevance,
        rationale = %decision.rationale,
    );
}

pub fn emit_run_finished(run_id: &str, state: RunStage, duration_ms: u64, error: Option<&PipelineError>) {
    match error {
        Some(err) => warn!(
            event = "run.finished",
            run_id = %run_id,
            state = %state,
            duration_ms = duration_ms,
            error_kind = ?err.kind(),
            error = %err,
        ),
        None => info!(
            event = "run.finished",
            run_id = %run_id,
            state = %state,
            duration_ms = duration_ms,
        ),
    }
}

/// Archiving a finished run failed. The run's outcome is unaffected.
pub fn emit_run_archive_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.archive_error", run_id = %run_id, error = %error);
}
