//! Domain models for autodoc.
//!
//! Canonical definitions for the values that flow through a run:
//! - `ChangeRequest`: what to document (immutable, from the trigger)
//! - `ChangeSet`: the loaded diff
//! - `ChangeSignal` / `Decision`: analyzer and decider outputs
//! - `DraftDocument` / `SaveResult`: generator and saver outputs
//! - `PipelineRun`: the aggregate tying one execution together

pub mod change;
pub mod draft;
pub mod request;
pub mod run;
pub mod signal;

pub use change::{ChangeKind, ChangeSet, FileChange};
pub use draft::{DraftDocument, SaveResult, TargetDocument};
pub use request::{ChangeRef, ChangeRequest, Credential};
pub use run::{ErrorReport, PipelineRun, RunReport, RunStage, StageFailure, StageRecord};
pub use signal::{ChangeSignal, Decision, DecisionAction};
