//! Pipeline stage definitions and tool commands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stages, declared in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    /// Create output directories and read the source stylesheet.
    Setup,

    /// Copy the source into a timestamped backup.
    Backup,

    /// Audit the source and write the audit reports.
    Audit,

    /// Run the auto-fixing linter.
    Lint,

    /// Classify rules into modules and write them.
    Organize,

    /// Development build.
    BuildDev,

    /// Production build with purge.
    BuildProd,

    /// Minify the dev and prod artifacts.
    Minify,

    /// Sanity checks on the final artifact.
    Validate,

    /// Savings report.
    Report,
}

/// What happens to the run when a stage returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the stage as fatal and stop.
    Abort,
    /// Record the stage as a warning and continue.
    Degrade,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 10] = [
        PipelineStage::Setup,
        PipelineStage::Backup,
        PipelineStage::Audit,
        PipelineStage::Lint,
        PipelineStage::Organize,
        PipelineStage::BuildDev,
        PipelineStage::BuildProd,
        PipelineStage::Minify,
        PipelineStage::Validate,
        PipelineStage::Report,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Setup => "setup",
            PipelineStage::Backup => "backup",
            PipelineStage::Audit => "audit",
            PipelineStage::Lint => "lint",
            PipelineStage::Organize => "organize",
            PipelineStage::BuildDev => "build-dev",
            PipelineStage::BuildProd => "build-prod",
            PipelineStage::Minify => "minify",
            PipelineStage::Validate => "validate",
            PipelineStage::Report => "report",
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            PipelineStage::Audit
            | PipelineStage::Lint
            | PipelineStage::Validate
            | PipelineStage::Report => FailurePolicy::Degrade,
            PipelineStage::Setup
            | PipelineStage::Backup
            | PipelineStage::Organize
            | PipelineStage::BuildDev
            | PipelineStage::BuildProd
            | PipelineStage::Minify => FailurePolicy::Abort,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage lifecycle: `pending -> running -> {ok | warning | fatal}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Ok,
    Warning,
    Fatal,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Ok | StageStatus::Warning | StageStatus::Fatal)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Ok => "ok",
            StageStatus::Warning => "warning",
            StageStatus::Fatal => "fatal",
        })
    }
}

/// An external tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Human-readable tool name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Disabled commands are skipped and their step counts as ok.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ToolCommand {
    pub fn custom(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            enabled: true,
        }
    }

    /// Run `line` through `sh -c`. An empty line yields a disabled command.
    pub fn shell(name: impl Into<String>, line: &str) -> Self {
        let line = line.trim();
        let cmd = Self::custom(
            name,
            vec!["sh".to_string(), "-c".to_string(), line.to_string()],
        );
        if line.is_empty() {
            cmd.disabled()
        } else {
            cmd
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command line for logs and error messages.
    pub fn display(&self) -> String {
        self.command.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<_> = PipelineStage::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "setup",
                "backup",
                "audit",
                "lint",
                "organize",
                "build-dev",
                "build-prod",
                "minify",
                "validate",
                "report"
            ]
        );
        let mut sorted = PipelineStage::ALL;
        sorted.sort();
        assert_eq!(sorted, PipelineStage::ALL);
    }

    #[test]
    fn test_failure_policies() {
        let degrade: Vec<_> = PipelineStage::ALL
            .iter()
            .filter(|s| s.failure_policy() == FailurePolicy::Degrade)
            .map(|s| s.name())
            .collect();
        assert_eq!(degrade, vec!["audit", "lint", "validate", "report"]);
    }

    #[test]
    fn test_stage_serde_names() {
        let json = serde_json::to_string(&PipelineStage::BuildProd).expect("serialize");
        assert_eq!(json, "\"build-prod\"");
        let status = serde_json::to_string(&StageStatus::Warning).expect("serialize");
        assert_eq!(status, "\"warning\"");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!StageStatus::default().is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Fatal.is_terminal());
    }

    #[test]
    fn test_shell_command() {
        let cmd = ToolCommand::shell("lint", "npx stylelint css --fix");
        assert_eq!(cmd.command, vec!["sh", "-c", "npx stylelint css --fix"]);
        assert!(cmd.enabled);
        assert!(!ToolCommand::shell("visual", "  ").enabled);
    }

    #[test]
    fn test_tool_command_enabled_defaults_on_deserialize() {
        let cmd: ToolCommand =
            serde_json::from_str(r#"{"name":"lint","command":["true"]}"#).expect("parse");
        assert!(cmd.enabled);
        assert_eq!(cmd.display(), "true");
    }
}
