//! Run record and the reports assembled from it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csspipe_core::report::AuditSummary;
use csspipe_core::{FileComparison, MinifyOutcome, TextStats};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StageError;
use crate::stage::{PipelineStage, StageStatus};
use crate::validate::ValidationReport;

/// Outcome of one completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Captured tool output for failed or warning tool steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Where the original stylesheet was copied before anything touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRef {
    pub original: PathBuf,
    pub backup: PathBuf,
    /// SHA-256 hex digest of the source text.
    pub digest: String,
    pub stats: TextStats,
}

/// Original source versus final artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsReport {
    pub original: TextStats,
    #[serde(rename = "final")]
    pub final_artifact: TextStats,
    pub bytes_saved: i64,
    pub lines_saved: i64,
    pub percentage: f64,
}

impl SavingsReport {
    pub fn between(original: TextStats, final_artifact: TextStats) -> Self {
        let bytes_saved = original.bytes as i64 - final_artifact.bytes as i64;
        let percentage = if original.bytes == 0 {
            0.0
        } else {
            bytes_saved as f64 / original.bytes as f64 * 100.0
        };
        Self {
            original,
            final_artifact,
            bytes_saved,
            lines_saved: original.lines as i64 - final_artifact.lines as i64,
            percentage,
        }
    }
}

/// Contents of `minification-comparison.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinificationReport {
    pub dev: MinifyOutcome,
    pub prod: MinifyOutcome,
    /// Source stylesheet versus final artifact.
    pub comparison: FileComparison,
}

/// Contents of `optimization-final-report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub savings: SavingsReport,
    pub stages: Vec<StageRecord>,
    pub audit: Option<AuditSummary>,
    pub validation: Option<ValidationReport>,
}

/// Append-only record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub source: PathBuf,
    pub backup: Option<BackupRef>,
    pub stages: Vec<StageRecord>,
    pub savings: Option<SavingsReport>,
}

impl PipelineRun {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            success: false,
            source: source.into(),
            backup: None,
            stages: Vec::new(),
            savings: None,
        }
    }

    pub fn push(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    /// Close the run. Successful when every reached stage is ok or warning
    /// and the final stage was reached.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.success = self.fatal_stage().is_none()
            && self.record(PipelineStage::Report).is_some();
    }

    pub fn record(&self, stage: PipelineStage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn status_of(&self, stage: PipelineStage) -> Option<StageStatus> {
        self.record(stage).map(|r| r.status)
    }

    pub fn fatal_stage(&self) -> Option<PipelineStage> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Fatal)
            .map(|r| r.stage)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|r| r.status == status).count()
    }

    pub fn duration_ms(&self) -> u64 {
        self.stages.iter().map(|r| r.duration_ms).sum()
    }

    /// Write the run as pretty JSON.
    pub fn persist(&self, path: &Path) -> Result<(), StageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StageError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| StageError::io(path, e))
    }
}
