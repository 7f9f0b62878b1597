//! Pipeline orchestration.
//!
//! Stages run strictly in [`PipelineStage::ALL`] order. Each stage function
//! returns `Result<StageOutcome, StageError>`; the orchestrator records the
//! outcome, applies the stage's [`FailurePolicy`] to errors, and stops at the
//! first fatal stage. The run record is persisted whether or not the run
//! reached the end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use csspipe_core::report::{self, GeneratedReport};
use csspipe_core::{
    audit_stylesheet, classify, compare_files, tokenize, write_modules, ClassifierTable,
    MinificationAdapter, MinifierConfig, RawStylesheet,
};
use tracing::{debug, error, info, warn};

use crate::config::{self, PipelineConfig};
use crate::error::StageError;
use crate::purge::find_critical_selectors;
use crate::run::{
    BackupRef, FinalReport, MinificationReport, PipelineRun, SavingsReport, StageRecord,
};
use crate::runner::{ProcessRunner, ToolOutput, ToolRunner};
use crate::stage::{FailurePolicy, PipelineStage, StageStatus, ToolCommand};
use crate::validate::{validate_artifact, ValidationReport, VisualCheck};

/// Callback invoked on every stage status transition.
pub type TransitionHook =
    Box<dyn Fn(PipelineStage, StageStatus, Option<&StageRecord>) + Send + Sync>;

/// Data a stage hands to later stages.
#[derive(Debug, Default)]
pub enum Produced {
    #[default]
    Nothing,
    Source(RawStylesheet),
    Backup(BackupRef),
    Audit(Box<GeneratedReport>),
    Minification(Box<MinificationReport>),
    Validation(Box<ValidationReport>),
    Savings(SavingsReport),
}

/// Successful (possibly degraded) result of a stage.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub message: Option<String>,
    pub artifacts: Vec<PathBuf>,
    pub output: Option<String>,
    pub produced: Produced,
}

impl StageOutcome {
    pub fn ok() -> Self {
        Self {
            status: StageStatus::Ok,
            ..Self::default()
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Warning,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn artifact(mut self, path: PathBuf) -> Self {
        self.artifacts.push(path);
        self
    }

    pub fn output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    pub fn producing(mut self, produced: Produced) -> Self {
        self.produced = produced;
        self
    }
}

/// Values produced by earlier stages.
#[derive(Debug, Default)]
struct RunState {
    source: Option<RawStylesheet>,
    audit: Option<GeneratedReport>,
    minification: Option<MinificationReport>,
    validation: Option<ValidationReport>,
}

impl RunState {
    fn source(&self) -> Result<&RawStylesheet, StageError> {
        self.source.as_ref().ok_or(StageError::Missing("source stylesheet"))
    }
}

/// Stylesheet build pipeline orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
    dev_minifier: MinifierConfig,
    prod_minifier: MinifierConfig,
    runner: Arc<dyn ToolRunner>,
    hook: Option<TransitionHook>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            dev_minifier: MinifierConfig::level1_only(),
            prod_minifier: MinifierConfig::full(),
            runner: Arc::new(ProcessRunner),
            hook: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Minifier settings for the production artifact.
    pub fn with_minifier(mut self, config: MinifierConfig) -> Self {
        self.prod_minifier = config;
        self
    }

    pub fn on_transition(mut self, hook: TransitionHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn notify(&self, stage: PipelineStage, status: StageStatus, record: Option<&StageRecord>) {
        if let Some(hook) = &self.hook {
            hook(stage, status, record);
        }
    }

    /// Execute every stage and return the run record.
    ///
    /// The record is also written to `reports/pipeline-run.json`.
    pub async fn run(&self) -> PipelineRun {
        let mut run = PipelineRun::new(self.config.source_path());
        let mut state = RunState::default();
        info!(run_id = %run.run_id, source = %run.source.display(), "Starting pipeline");

        for stage in PipelineStage::ALL {
            self.notify(stage, StageStatus::Pending, None);
        }

        for stage in PipelineStage::ALL {
            self.notify(stage, StageStatus::Running, None);
            let start = Instant::now();
            let result = self.execute(stage, &state, &run).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let record = match result {
                Ok(outcome) => {
                    let record = StageRecord {
                        stage,
                        status: outcome.status,
                        duration_ms,
                        artifacts: outcome.artifacts,
                        message: outcome.message,
                        output: outcome.output,
                    };
                    match outcome.produced {
                        Produced::Nothing => {}
                        Produced::Source(sheet) => state.source = Some(sheet),
                        Produced::Backup(backup) => run.backup = Some(backup),
                        Produced::Audit(report) => state.audit = Some(*report),
                        Produced::Minification(report) => state.minification = Some(*report),
                        Produced::Validation(report) => state.validation = Some(*report),
                        Produced::Savings(savings) => run.savings = Some(savings),
                    }
                    record
                }
                Err(err) => {
                    let status = match stage.failure_policy() {
                        FailurePolicy::Degrade => {
                            warn!(stage = %stage, error = %err, "Stage degraded");
                            StageStatus::Warning
                        }
                        FailurePolicy::Abort => {
                            error!(stage = %stage, error = %err, "Stage failed");
                            StageStatus::Fatal
                        }
                    };
                    StageRecord {
                        stage,
                        status,
                        duration_ms,
                        artifacts: Vec::new(),
                        message: Some(err.to_string()),
                        output: err.output().map(str::to_string),
                    }
                }
            };

            info!(stage = %stage, status = %record.status, duration_ms, "Stage finished");
            self.notify(stage, record.status, Some(&record));
            let fatal = record.status == StageStatus::Fatal;
            run.push(record);
            if fatal {
                break;
            }
        }

        run.finish();
        let record_path = self.config.report_file(config::RUN_RECORD);
        if let Err(e) = run.persist(&record_path) {
            warn!(error = %e, "Could not persist run record");
        }

        if run.success {
            info!(run_id = %run.run_id, "Pipeline completed successfully");
        } else {
            info!(run_id = %run.run_id, fatal = ?run.fatal_stage(), "Pipeline failed");
        }
        run
    }

    async fn execute(
        &self,
        stage: PipelineStage,
        state: &RunState,
        run: &PipelineRun,
    ) -> Result<StageOutcome, StageError> {
        match stage {
            PipelineStage::Setup => self.setup(),
            PipelineStage::Backup => self.backup(state),
            PipelineStage::Audit => self.audit(state),
            PipelineStage::Lint => self.lint().await,
            PipelineStage::Organize => self.organize(state),
            PipelineStage::BuildDev => self.build_dev(state).await,
            PipelineStage::BuildProd => self.build_prod(state).await,
            PipelineStage::Minify => self.minify(),
            PipelineStage::Validate => self.validate(state).await,
            PipelineStage::Report => self.report(state, run),
        }
    }

    fn setup(&self) -> Result<StageOutcome, StageError> {
        for dir in self.config.output_dirs() {
            std::fs::create_dir_all(&dir).map_err(|e| StageError::io(&dir, e))?;
        }
        for name in config::DIST_ARTIFACTS {
            let path = self.config.dist_file(name);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed stale artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StageError::io(&path, e)),
            }
        }
        let sheet = RawStylesheet::read(&self.config.source_path())?;
        let message = format!("{} bytes, {} lines", sheet.byte_len(), sheet.line_count());
        Ok(StageOutcome::ok()
            .message(message)
            .producing(Produced::Source(sheet)))
    }

    fn backup(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let sheet = state.source()?;
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self.config.backups_path().join(format!("style-{}.css", stamp));
        std::fs::write(&path, sheet.text()).map_err(|e| StageError::io(&path, e))?;

        let backup = BackupRef {
            original: self.config.source_path(),
            backup: path.clone(),
            digest: sheet.digest(),
            stats: sheet.stats(),
        };
        debug!(digest = %backup.digest, path = %path.display(), "Backup written");
        Ok(StageOutcome::ok()
            .artifact(path)
            .producing(Produced::Backup(backup)))
    }

    fn audit(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let audit = audit_stylesheet(state.source()?)?;
        let initial = self.config.report_file(config::INITIAL_AUDIT_REPORT);
        std::fs::write(&initial, serde_json::to_string_pretty(&audit)?)
            .map_err(|e| StageError::io(&initial, e))?;

        let generated = report::generate(&audit);
        let (json, text) = report::write_report_pair(
            &self.config.reports_path(),
            config::AUDIT_REPORT_STEM,
            &generated,
        )?;
        let message = format!(
            "{} critical, {} warning, {} info",
            generated.issues.critical.len(),
            generated.issues.warning.len(),
            generated.issues.info.len()
        );

        Ok(StageOutcome::ok()
            .message(message)
            .artifact(initial)
            .artifact(json)
            .artifact(text)
            .producing(Produced::Audit(Box::new(generated))))
    }

    async fn lint(&self) -> Result<StageOutcome, StageError> {
        let path = self.config.report_file(config::LINT_OUTPUT);
        let Some(out) = self.invoke(&self.config.lint).await? else {
            std::fs::write(&path, "lint disabled\n").map_err(|e| StageError::io(&path, e))?;
            return Ok(StageOutcome::ok().message("disabled").artifact(path));
        };

        let combined = out.combined();
        std::fs::write(&path, &combined).map_err(|e| StageError::io(&path, e))?;
        if out.passed() {
            Ok(StageOutcome::ok().artifact(path))
        } else {
            Ok(StageOutcome::warning(format!(
                "{} exited with code {}",
                self.config.lint.name, out.exit_code
            ))
            .artifact(path)
            .output(combined))
        }
    }

    fn organize(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let sheet = state.source()?;
        let rules = tokenize(sheet.text());
        let token_count = rules.len();
        let table = ClassifierTable::builtin()?;
        let modules = classify(&table, rules);
        debug_assert_eq!(modules.total_rules(), token_count);

        let written = write_modules(&modules, &self.config.modules_path())?;
        let message = format!(
            "{} rules into {} modules",
            token_count,
            written.iter().filter(|f| f.module.is_some()).count()
        );
        let mut outcome = StageOutcome::ok().message(message);
        for file in written {
            outcome = outcome.artifact(file.path);
        }
        Ok(outcome)
    }

    async fn build_dev(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let artifact = self.config.dist_file(config::DEV_BUILD);
        match self.build(&self.config.build_dev, &artifact).await? {
            Some(_) => Ok(StageOutcome::ok().artifact(artifact)),
            None => self.source_fallback(state, &self.config.build_dev, artifact),
        }
    }

    async fn build_prod(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let artifact = self.config.dist_file(config::PROD_BUILD);
        let Some(out) = self.build(&self.config.build_prod, &artifact).await? else {
            return self.source_fallback(state, &self.config.build_prod, artifact);
        };

        let mut removed = out.combined();
        if let Some(report) = self.config.purge_report_path() {
            match std::fs::read_to_string(&report) {
                Ok(text) => removed.push_str(&text),
                Err(e) => debug!(path = %report.display(), error = %e, "No purge report"),
            }
        }

        let flagged = find_critical_selectors(&removed, &self.config.critical_prefixes)?;
        if flagged.is_empty() {
            return Ok(StageOutcome::ok().artifact(artifact));
        }
        warn!(selectors = ?flagged, "Purge removed critical selectors");
        Ok(StageOutcome::warning(format!(
            "possible over-purge, removed: {}",
            flagged.join(", ")
        ))
        .artifact(artifact))
    }

    /// Stand in for a disabled build: the source stylesheet becomes the artifact.
    fn source_fallback(
        &self,
        state: &RunState,
        command: &ToolCommand,
        artifact: PathBuf,
    ) -> Result<StageOutcome, StageError> {
        let sheet = state.source()?;
        std::fs::write(&artifact, sheet.text()).map_err(|e| StageError::io(&artifact, e))?;
        warn!(tool = %command.name, path = %artifact.display(), "Build disabled, using source");
        Ok(StageOutcome::warning(format!(
            "{} disabled; source stylesheet used as artifact",
            command.name
        ))
        .artifact(artifact))
    }

    fn minify(&self) -> Result<StageOutcome, StageError> {
        let dev_in = self.config.dist_file(config::DEV_BUILD);
        let dev_out = self.config.dist_file(config::DEV_MINIFIED);
        let prod_in = self.config.dist_file(config::PROD_BUILD);
        let prod_out = self.config.dist_file(config::FINAL_ARTIFACT);

        let dev =
            MinificationAdapter::new(self.dev_minifier.clone()).minify_file(&dev_in, &dev_out)?;
        let prod =
            MinificationAdapter::new(self.prod_minifier.clone()).minify_file(&prod_in, &prod_out)?;
        let comparison = compare_files(&self.config.source_path(), &prod_out)?;

        let report = MinificationReport {
            dev,
            prod,
            comparison,
        };
        let path = self.config.report_file(config::MINIFICATION_REPORT);
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .map_err(|e| StageError::io(&path, e))?;

        let message = format!(
            "{} -> {} bytes ({:.1}%)",
            report.comparison.original.bytes,
            report.comparison.optimized.bytes,
            report.comparison.percentage
        );
        Ok(StageOutcome::ok()
            .message(message)
            .artifact(dev_out)
            .artifact(prod_out)
            .artifact(path)
            .producing(Produced::Minification(Box::new(report))))
    }

    async fn validate(&self, state: &RunState) -> Result<StageOutcome, StageError> {
        let artifact = self.config.dist_file(config::FINAL_ARTIFACT);
        let mut report = validate_artifact(&artifact, state.source()?.text())?;

        let command = self.config.visual_test.display();
        match self.invoke(&self.config.visual_test).await {
            Ok(Some(out)) => {
                report = report.with_visual(VisualCheck {
                    command,
                    exit_code: out.exit_code,
                    passed: out.passed(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Visual regression check could not run");
                report = report.with_visual_error(&command, &e);
            }
        }

        let outcome = if report.is_clean() {
            StageOutcome::ok().message(format!("{} bytes", report.bytes))
        } else {
            StageOutcome::warning(report.warnings.join("; "))
        };
        Ok(outcome.producing(Produced::Validation(Box::new(report))))
    }

    fn report(&self, state: &RunState, run: &PipelineRun) -> Result<StageOutcome, StageError> {
        let original = state.source()?.stats();
        let final_stats =
            RawStylesheet::read(&self.config.dist_file(config::FINAL_ARTIFACT))?.stats();
        let savings = SavingsReport::between(original, final_stats);

        let report = FinalReport {
            run_id: run.run_id,
            generated_at: Utc::now(),
            savings: savings.clone(),
            stages: run.stages.clone(),
            audit: state.audit.as_ref().map(|a| a.summary.clone()),
            validation: state.validation.clone(),
        };
        let path = self.config.report_file(config::FINAL_REPORT);
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .map_err(|e| StageError::io(&path, e))?;

        if let Some(minification) = &state.minification {
            debug!(
                dev_saved = minification.dev.savings,
                prod_saved = minification.prod.savings,
                "Minification totals"
            );
        }

        Ok(StageOutcome::ok()
            .message(format!(
                "{} bytes saved ({:.1}%)",
                savings.bytes_saved, savings.percentage
            ))
            .artifact(path)
            .producing(Produced::Savings(savings)))
    }

    /// Run a tool in the project root; `None` when it is disabled.
    async fn invoke(&self, command: &ToolCommand) -> Result<Option<ToolOutput>, StageError> {
        if !command.enabled {
            debug!(tool = %command.name, "Skipping disabled tool");
            return Ok(None);
        }
        let out = self.runner.run(command, &self.config.root).await?;
        debug!(
            tool = %command.name,
            exit_code = out.exit_code,
            duration_ms = out.duration_ms,
            "Tool finished"
        );
        Ok(Some(out))
    }

    /// Run a build tool; a non-zero exit or a missing artifact is a build error.
    async fn build(
        &self,
        command: &ToolCommand,
        artifact: &std::path::Path,
    ) -> Result<Option<ToolOutput>, StageError> {
        let Some(out) = self.invoke(command).await? else {
            return Ok(None);
        };
        if !out.passed() {
            return Err(StageError::Build {
                command: command.display(),
                exit_code: out.exit_code,
                output: out.combined(),
            });
        }
        if !artifact.is_file() {
            return Err(StageError::io(
                artifact,
                std::io::Error::new(std::io::ErrorKind::NotFound, "build artifact not produced"),
            ));
        }
        Ok(Some(out))
    }
}
