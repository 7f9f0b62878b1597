//! Pipeline configuration.
//!
//! Resolution order: [`PipelineConfig::default`], then an optional JSON file,
//! then `CSSPIPE_*` environment variables. The CLI applies its flags last.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::stage::ToolCommand;

/// Development build output, relative to the dist directory.
pub const DEV_BUILD: &str = "style.dev.css";
pub const DEV_MINIFIED: &str = "style.dev.min.css";
/// Production build (purged) output.
pub const PROD_BUILD: &str = "style.min.css";
pub const FINAL_ARTIFACT: &str = "style.final.min.css";
/// Every file a run writes into the dist directory. Cleared at setup so a
/// run never reads what an earlier run left behind.
pub const DIST_ARTIFACTS: [&str; 4] = [DEV_BUILD, DEV_MINIFIED, PROD_BUILD, FINAL_ARTIFACT];

pub const INITIAL_AUDIT_REPORT: &str = "audit-inicial.json";
pub const AUDIT_REPORT_STEM: &str = "css-audit";
pub const MINIFICATION_REPORT: &str = "minification-comparison.json";
pub const FINAL_REPORT: &str = "optimization-final-report.json";
pub const LINT_OUTPUT: &str = "lint-output.txt";
pub const RUN_RECORD: &str = "pipeline-run.json";

/// Selector prefixes whose removal by the purge step is suspicious.
pub const CRITICAL_PREFIXES: &[&str] = &[".hero", ".nav", ".btn", ".feature", ".contact"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Project root; relative paths below resolve against it and tools run in it.
    pub root: PathBuf,
    pub source: PathBuf,
    pub backups_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub lint: ToolCommand,
    pub build_dev: ToolCommand,
    pub build_prod: ToolCommand,
    pub visual_test: ToolCommand,
    /// File where the purge tool lists rejected selectors, if it writes one.
    pub purge_rejected_report: Option<PathBuf>,
    pub critical_prefixes: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            source: PathBuf::from("css/style.css"),
            backups_dir: PathBuf::from("backups"),
            modules_dir: PathBuf::from("css-modules"),
            dist_dir: PathBuf::from("dist"),
            reports_dir: PathBuf::from("reports"),
            lint: ToolCommand::custom(
                "stylelint",
                argv(&["npx", "stylelint", "css/**/*.css", "--fix"]),
            ),
            build_dev: ToolCommand::custom(
                "postcss-dev",
                argv(&["npx", "postcss", "css-modules/style.css", "-o", "dist/style.dev.css"]),
            ),
            build_prod: ToolCommand::custom(
                "postcss-prod",
                argv(&[
                    "npx",
                    "postcss",
                    "css-modules/style.css",
                    "-o",
                    "dist/style.min.css",
                    "--env",
                    "production",
                ]),
            ),
            visual_test: ToolCommand::custom("backstop", argv(&["npx", "backstop", "test"]))
                .disabled(),
            purge_rejected_report: None,
            critical_prefixes: CRITICAL_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Defaults rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, StageError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StageError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `CSSPIPE_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Command values are shell lines;
    /// an empty value disables the tool.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(source) = lookup("CSSPIPE_SOURCE").filter(|s| !s.trim().is_empty()) {
            self.source = PathBuf::from(source);
        }
        if let Some(line) = lookup("CSSPIPE_LINT_CMD") {
            self.lint = ToolCommand::shell(self.lint.name.clone(), &line);
        }
        if let Some(line) = lookup("CSSPIPE_BUILD_DEV_CMD") {
            self.build_dev = ToolCommand::shell(self.build_dev.name.clone(), &line);
        }
        if let Some(line) = lookup("CSSPIPE_BUILD_PROD_CMD") {
            self.build_prod = ToolCommand::shell(self.build_prod.name.clone(), &line);
        }
        if let Some(line) = lookup("CSSPIPE_VISUAL_CMD") {
            self.visual_test = ToolCommand::shell(self.visual_test.name.clone(), &line);
        }
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn source_path(&self) -> PathBuf {
        self.resolve(&self.source)
    }

    pub fn backups_path(&self) -> PathBuf {
        self.resolve(&self.backups_dir)
    }

    pub fn modules_path(&self) -> PathBuf {
        self.resolve(&self.modules_dir)
    }

    pub fn dist_path(&self) -> PathBuf {
        self.resolve(&self.dist_dir)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }

    pub fn dist_file(&self, name: &str) -> PathBuf {
        self.dist_path().join(name)
    }

    pub fn report_file(&self, name: &str) -> PathBuf {
        self.reports_path().join(name)
    }

    pub fn purge_report_path(&self) -> Option<PathBuf> {
        self.purge_rejected_report.as_deref().map(|p| self.resolve(p))
    }

    /// Every directory the setup stage creates.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.backups_path(),
            self.modules_path(),
            self.dist_path(),
            self.reports_path(),
        ]
    }
}
