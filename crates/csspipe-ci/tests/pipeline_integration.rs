//! Integration tests for the pipeline with real sub-processes.

use csspipe_ci::config::{self, PipelineConfig};
use csspipe_ci::{Pipeline, PipelineRun, PipelineStage, StageStatus, ToolCommand};
use tempfile::TempDir;

const SOURCE: &str = r#"
:root { --brand: #0af; --gap: 8px; }
*, *::before, *::after { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, sans-serif; }
.container { max-width: 1200px; margin: 0 auto; }
.hero { background: linear-gradient( to right , #fff 0% , var(--brand) 100% ); }
.btn { padding: 4px 8px; border-radius: 4px; }
.btn { color: white !important; }
.mt-2 { margin-top: .5rem; }
@keyframes fade { from { opacity: 0; } to { opacity: 1; } }
@media (max-width: 768px) { .container { padding: 0 var(--gap); } }
"#;

/// A project whose build tools concatenate the written modules.
fn project() -> (TempDir, PipelineConfig) {
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("css")).expect("mkdir");
    std::fs::write(dir.path().join("css/style.css"), SOURCE).expect("write source");

    let mut config = PipelineConfig::at(dir.path());
    config.lint = ToolCommand::shell("lint", "echo 'css/style.css: 0 problems'");
    config.build_dev = ToolCommand::shell(
        "build-dev",
        "cat css-modules/_*.css > dist/style.dev.css",
    );
    config.build_prod = ToolCommand::shell(
        "build-prod",
        "cat css-modules/_*.css > dist/style.min.css && echo 'purged 0 selectors'",
    );
    (dir, config)
}

fn load_run(config: &PipelineConfig) -> PipelineRun {
    let raw = std::fs::read_to_string(config.report_file(config::RUN_RECORD)).expect("run record");
    serde_json::from_str(&raw).expect("parse run record")
}

/// Test: every stage succeeds and every output lands on disk
#[tokio::test]
async fn test_successful_pipeline() {
    let (_dir, config) = project();
    let run = Pipeline::new(config.clone()).run().await;

    assert!(run.success, "stages: {:?}", run.stages);
    assert_eq!(run.stages.len(), PipelineStage::ALL.len());
    assert!(run.fatal_stage().is_none());

    let order: Vec<_> = run.stages.iter().map(|r| r.stage).collect();
    assert_eq!(order, PipelineStage::ALL.to_vec());

    for name in [
        config::DEV_BUILD,
        config::DEV_MINIFIED,
        config::PROD_BUILD,
        config::FINAL_ARTIFACT,
    ] {
        assert!(config.dist_file(name).is_file(), "missing {}", name);
    }
    let aggregator = std::fs::read_to_string(config.modules_path().join("style.css")).expect("aggregator");
    assert!(aggregator.contains("@import url('_variables.css');"));

    let savings = run.savings.as_ref().expect("savings");
    assert!(savings.bytes_saved > 0);
    assert!(savings.final_artifact.lines <= savings.original.lines);

    let backup = run.backup.as_ref().expect("backup");
    assert_eq!(std::fs::read_to_string(&backup.backup).expect("backup"), SOURCE);
    assert_eq!(backup.digest.len(), 64);

    let persisted = load_run(&config);
    assert_eq!(persisted.run_id, run.run_id);
    assert!(persisted.success);

    let final_report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.report_file(config::FINAL_REPORT)).expect("final report"),
    )
    .expect("parse final report");
    assert!(final_report["savings"]["bytes_saved"].as_i64().unwrap_or_default() > 0);
    assert!(final_report["audit"]["important_count"].as_u64() == Some(1));
}

/// Test: a failing linter is a warning, its output is kept, and organize still runs
#[tokio::test]
async fn test_lint_failure_is_not_fatal() {
    let (_dir, mut config) = project();
    config.lint = ToolCommand::shell(
        "lint",
        "echo 'css/style.css 7:3 Unexpected duplicate selector \".btn\"'; exit 2",
    );

    let run = Pipeline::new(config.clone()).run().await;

    assert_eq!(run.status_of(PipelineStage::Lint), Some(StageStatus::Warning));
    assert_eq!(run.status_of(PipelineStage::Organize), Some(StageStatus::Ok));
    assert!(run.success);

    let lint_output = std::fs::read_to_string(config.report_file(config::LINT_OUTPUT)).expect("lint output");
    assert!(lint_output.contains("Unexpected duplicate selector"));

    let lint = run.record(PipelineStage::Lint).expect("lint record");
    assert!(lint.message.as_deref().is_some_and(|m| m.contains("code 2")));
}

/// Test: a failing dev build aborts the run but keeps what was already written
#[tokio::test]
async fn test_build_failure_is_fatal() {
    let (_dir, mut config) = project();
    config.build_dev = ToolCommand::shell("build-dev", "echo 'CssSyntaxError: Unknown word' >&2; false");

    let run = Pipeline::new(config.clone()).run().await;

    assert!(!run.success);
    assert_eq!(run.fatal_stage(), Some(PipelineStage::BuildDev));
    assert_eq!(run.stages.last().map(|r| r.stage), Some(PipelineStage::BuildDev));
    let record = run.record(PipelineStage::BuildDev).expect("record");
    assert!(record.output.as_deref().is_some_and(|o| o.contains("Unknown word")));

    assert!(config.report_file(config::INITIAL_AUDIT_REPORT).is_file());
    assert!(config.report_file("css-audit.txt").is_file());
    assert!(config.modules_path().join("_components.css").is_file());
    assert!(!config.report_file(config::FINAL_REPORT).exists());

    let persisted = load_run(&config);
    assert!(!persisted.success);
    assert_eq!(persisted.fatal_stage(), Some(PipelineStage::BuildDev));
}

/// Test: a build that exits 0 without producing its artifact is fatal
#[tokio::test]
async fn test_missing_build_artifact_is_fatal() {
    let (_dir, mut config) = project();
    config.build_prod = ToolCommand::shell("build-prod", "true");

    let run = Pipeline::new(config).run().await;
    assert_eq!(run.fatal_stage(), Some(PipelineStage::BuildProd));
}

/// Test: critical selectors in the purge report produce a build-prod warning
#[tokio::test]
async fn test_over_purge_warning() {
    let (dir, mut config) = project();
    std::fs::write(dir.path().join("purge-rejected.txt"), ".feature-card\n.contact-form\n")
        .expect("write purge report");
    config.purge_rejected_report = Some("purge-rejected.txt".into());

    let run = Pipeline::new(config).run().await;

    let record = run.record(PipelineStage::BuildProd).expect("record");
    assert_eq!(record.status, StageStatus::Warning);
    let message = record.message.clone().unwrap_or_default();
    assert!(message.contains(".contact-form"));
    assert!(message.contains(".feature-card"));
    assert!(run.success);
}

/// Test: a failing visual check degrades validate without failing the run
#[tokio::test]
async fn test_visual_regression_failure_is_warning() {
    let (_dir, mut config) = project();
    config.visual_test = ToolCommand::shell("visual", "exit 1");

    let run = Pipeline::new(config).run().await;

    assert_eq!(run.status_of(PipelineStage::Validate), Some(StageStatus::Warning));
    assert_eq!(run.status_of(PipelineStage::Report), Some(StageStatus::Ok));
    assert!(run.success);
}

/// Test: a stylesheet the auditor cannot parse degrades audit and leaves it out of the report
#[tokio::test]
async fn test_unparseable_source_degrades_audit() {
    let (dir, config) = project();
    std::fs::write(dir.path().join("css/style.css"), "){}").expect("write source");

    let run = Pipeline::new(config.clone()).run().await;

    assert_eq!(run.status_of(PipelineStage::Audit), Some(StageStatus::Warning));
    assert_eq!(run.status_of(PipelineStage::Organize), Some(StageStatus::Ok));
    assert_eq!(run.status_of(PipelineStage::Report), Some(StageStatus::Ok));
    assert!(!config.report_file("css-audit.json").exists());

    let final_report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.report_file(config::FINAL_REPORT)).expect("final report"),
    )
    .expect("parse final report");
    assert!(final_report["audit"].is_null());
}

/// Test: with both builds disabled the source stands in for their artifacts
#[tokio::test]
async fn test_disabled_builds_use_source_not_stale_dist() {
    let (_dir, mut config) = project();
    config.build_dev = config.build_dev.disabled();
    config.build_prod = config.build_prod.disabled();
    std::fs::create_dir_all(config.dist_path()).expect("mkdir dist");
    for name in [config::DEV_BUILD, config::PROD_BUILD] {
        std::fs::write(config.dist_file(name), ".stale{color:green}").expect("write stale");
    }

    let run = Pipeline::new(config.clone()).run().await;

    assert!(run.success, "stages: {:?}", run.stages);
    assert_eq!(run.status_of(PipelineStage::BuildDev), Some(StageStatus::Warning));
    assert_eq!(run.status_of(PipelineStage::BuildProd), Some(StageStatus::Warning));
    let final_css = std::fs::read_to_string(config.dist_file(config::FINAL_ARTIFACT)).expect("final");
    assert!(final_css.contains(".hero"));
    assert!(!final_css.contains(".stale"));
}
