//! External tool execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::StageError;
use crate::stage::ToolCommand;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub name: String,
    /// `-1` when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl ToolOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// stdout followed by stderr, for report files.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs external tools on behalf of the pipeline.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `command` with `cwd` as working directory and wait for it.
    /// A non-zero exit is a normal [`ToolOutput`]; only failing to start is an error.
    async fn run(&self, command: &ToolCommand, cwd: &Path) -> Result<ToolOutput, StageError>;
}

/// [`ToolRunner`] backed by real sub-processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand, cwd: &Path) -> Result<ToolOutput, StageError> {
        let start = Instant::now();

        let Some((exe, args)) = command.command.split_first() else {
            return Err(StageError::Spawn {
                command: command.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        debug!(tool = %command.name, cmd = %command.display(), cwd = %cwd.display(), "spawning");
        let child = Command::new(exe)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StageError::Spawn {
                command: command.display(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| StageError::Spawn {
                command: command.display(),
                source,
            })?;

        Ok(ToolOutput {
            name: command.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}
