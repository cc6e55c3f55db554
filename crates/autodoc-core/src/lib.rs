//! autodoc core library
//!
//! The change-to-document pipeline: a change request is loaded as a diff,
//! analyzed for documentation relevance, run through a generate/skip/defer
//! policy and, when warranted, turned into a document by an LLM provider
//! and persisted.
//!
//! ```text
//! ChangeRequest -> ChangeLoader -> ChangeAnalyzer -> DocumentDecider
//!                                                     |-> Skipped / Deferred
//!                                                     '-> DocumentGenerator -> DocumentSaver
//! ```
//!
//! [`Orchestrator`] owns the state machine, retry policy and timeouts.

pub mod analyzer;
pub mod config;
pub mod decider;
pub mod diff;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod generator;
pub mod glob;
pub mod loader;
pub mod obs;
pub mod orchestrator;
pub mod retry;
pub mod saver;
pub mod telemetry;
pub mod trigger;

pub use analyzer::{ChangeAnalyzer, ChangeClassifier, FileClassification, HeuristicClassifier};
pub use config::{PipelineConfig, ProviderSettings, ProvidersConfig};
pub use decider::DocumentDecider;
pub use diff::parse_unified_diff;
pub use domain::{
    ChangeKind, ChangeRef, ChangeRequest, ChangeSet, ChangeSignal, Credential, Decision,
    DecisionAction, DraftDocument, FileChange, PipelineRun, RunReport, RunStage, SaveResult,
    TargetDocument,
};
pub use error::{ErrorKind, PipelineError, ProviderError, Result};
pub use generator::{
    CompletionCache, CompletionOptions, CompletionProvider, DocumentGenerator, ProviderKind,
    ProviderRegistry,
};
pub use loader::{ChangeLoader, DiffSource, FileDiffSource};
pub use orchestrator::{Branch, Orchestrator, OrchestratorBuilder};
pub use retry::RetryPolicy;
pub use saver::DocumentSaver;
pub use telemetry::{init_tracing, LogFormat, TelemetryOptions};
pub use trigger::{requests_from_webhook, TriggerError};
