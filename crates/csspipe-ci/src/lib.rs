//! csspipe CI - stylesheet build pipeline
//!
//! Provides a pipeline orchestrator that:
//! - Backs up and audits the source stylesheet
//! - Runs external lint and build tools
//! - Organizes rules into modules, minifies and validates the result
//! - Persists every report it managed to produce, even on a fatal stage

pub mod config;
pub mod error;
pub mod pipeline;
pub mod purge;
pub mod run;
pub mod runner;
pub mod stage;
pub mod validate;

// Re-export key types
pub use config::PipelineConfig;
pub use error::StageError;
pub use pipeline::{Pipeline, StageOutcome, TransitionHook};
pub use run::{
    BackupRef, FinalReport, MinificationReport, PipelineRun, SavingsReport, StageRecord,
};
pub use runner::{ProcessRunner, ToolOutput, ToolRunner};
pub use stage::{FailurePolicy, PipelineStage, StageStatus, ToolCommand};
pub use validate::{validate_artifact, FeatureSet, ValidationReport};
