//! csspipe - CSS build and optimization pipeline CLI
//!
//! Every pipeline component can be run on its own, and `run` chains them.
//!
//! ## Commands
//!
//! - `tokenize`: Split a stylesheet into top-level rules
//! - `organize`: Classify rules into module files plus an aggregator
//! - `audit`: Audit a stylesheet and print the severity-bucketed report
//! - `minify`: Minify one file and print the size delta
//! - `compare`: Compare two files by bytes and lines
//! - `validate`: Sanity-check a built artifact against its source
//! - `run`: Execute the full pipeline

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::{OwoColorize, Stream::Stdout};
use tracing::{debug, Level};

use csspipe_ci::{
    validate_artifact, Pipeline, PipelineConfig, PipelineRun, PipelineStage, StageRecord,
    StageStatus, ToolCommand,
};
use csspipe_core::{
    audit_stylesheet, classify, compare_files, report, tokenize, write_modules, ClassifierTable,
    MinificationAdapter, MinifierConfig, RawStylesheet,
};

#[derive(Parser)]
#[command(name = "csspipe")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CSS build and optimization pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a stylesheet into top-level rules
    Tokenize {
        /// Stylesheet to read
        #[arg(default_value = "css/style.css")]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Classify rules and write one file per module plus an aggregator
    Organize {
        /// Stylesheet to read
        #[arg(default_value = "css/style.css")]
        file: PathBuf,

        /// Output directory for module files
        #[arg(short, long, default_value = "css-modules")]
        out: PathBuf,
    },

    /// Audit a stylesheet
    Audit {
        /// Stylesheet to read
        #[arg(default_value = "css/style.css")]
        file: PathBuf,

        /// Also write css-audit.json and css-audit.txt into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Minify a stylesheet
    Minify {
        /// Input stylesheet
        input: PathBuf,

        /// Output path
        output: PathBuf,

        /// Skip structural (level-2) optimizations
        #[arg(long)]
        level1_only: bool,
    },

    /// Compare two files by size and line count
    Compare {
        /// Original file
        original: PathBuf,

        /// Optimized file
        optimized: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Sanity-check a built artifact
    Validate {
        /// Artifact to check
        #[arg(default_value = "dist/style.final.min.css")]
        artifact: PathBuf,

        /// Source stylesheet the artifact was built from
        #[arg(long, default_value = "css/style.css")]
        source: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Run the full pipeline
    Run(RunArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Project root (tools run here, relative paths resolve against it)
    #[arg(long, env = "CSSPIPE_ROOT")]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, env = "CSSPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Source stylesheet, relative to the root
    #[arg(long)]
    source: Option<PathBuf>,

    /// Lint command line (empty disables linting)
    #[arg(long)]
    lint_cmd: Option<String>,

    /// Development build command line
    #[arg(long)]
    build_dev_cmd: Option<String>,

    /// Production build command line
    #[arg(long)]
    build_prod_cmd: Option<String>,

    /// Visual regression command line
    #[arg(long)]
    visual_cmd: Option<String>,

    /// File where the purge tool lists rejected selectors
    #[arg(long)]
    purge_report: Option<PathBuf>,

    /// Skip structural (level-2) optimizations for the final artifact
    #[arg(long)]
    level1_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    csspipe_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Tokenize { file, format } => cmd_tokenize(&file, format),
        Commands::Organize { file, out } => cmd_organize(&file, &out),
        Commands::Audit {
            file,
            report_dir,
            format,
        } => cmd_audit(&file, report_dir.as_deref(), format),
        Commands::Minify {
            input,
            output,
            level1_only,
        } => cmd_minify(&input, &output, level1_only),
        Commands::Compare {
            original,
            optimized,
            format,
        } => cmd_compare(&original, &optimized, format),
        Commands::Validate {
            artifact,
            source,
            format,
        } => cmd_validate(&artifact, &source, format),
        Commands::Run(args) => cmd_run(args).await,
    }
}

fn read_sheet(path: &Path) -> Result<RawStylesheet> {
    RawStylesheet::read(path).with_context(|| format!("read stylesheet {:?}", path))
}

fn ok_mark() -> String {
    "✓".if_supports_color(Stdout, |t| t.green()).to_string()
}

fn warn_mark() -> String {
    "!".if_supports_color(Stdout, |t| t.yellow()).to_string()
}

fn fail_mark() -> String {
    "✗".if_supports_color(Stdout, |t| t.red()).to_string()
}

fn cmd_tokenize(file: &Path, format: Format) -> Result<()> {
    let sheet = read_sheet(file)?;
    let rules = tokenize(sheet.text());

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    for rule in &rules {
        let partial = if rule.partial { " (partial)" } else { "" };
        println!(
            "{:>6}  {}{}",
            rule.line,
            rule.prelude(),
            partial.if_supports_color(Stdout, |t| t.yellow())
        );
    }
    println!();
    println!(
        "{} rules, {} bytes, {} lines",
        rules.len(),
        sheet.byte_len(),
        sheet.line_count()
    );
    Ok(())
}

fn cmd_organize(file: &Path, out: &Path) -> Result<()> {
    let sheet = read_sheet(file)?;
    let rules = tokenize(sheet.text());
    let total = rules.len();
    let table = ClassifierTable::builtin().context("build classifier table")?;
    let modules = classify(&table, rules);

    let written =
        write_modules(&modules, out).with_context(|| format!("write modules to {:?}", out))?;
    for file in &written {
        match file.module {
            Some(module) => println!(
                "  {} {:<12} {:>4} rules  {}",
                ok_mark(),
                module.name(),
                file.rules,
                file.path.display()
            ),
            None => println!(
                "  {} {:<12}             {}",
                ok_mark(),
                "aggregator",
                file.path.display()
            ),
        }
    }
    println!();
    println!("{} rules organized into {} modules", total, written.len() - 1);
    Ok(())
}

fn cmd_audit(file: &Path, report_dir: Option<&Path>, format: Format) -> Result<()> {
    let sheet = read_sheet(file)?;
    let audit = audit_stylesheet(&sheet).with_context(|| format!("audit {:?}", file))?;
    let generated = report::generate(&audit);

    if let Some(dir) = report_dir {
        let (json, text) = report::write_report_pair(dir, "css-audit", &generated)
            .with_context(|| format!("write audit reports to {:?}", dir))?;
        debug!(json = %json.display(), text = %text.display(), "Audit reports written");
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&generated)?),
        Format::Text => {
            print!("{}", report::render_text(&generated));
            let critical = generated.issues.critical.len();
            println!();
            if critical > 0 {
                println!("{} {} critical issue(s)", fail_mark(), critical);
            } else {
                println!("{} No critical issues", ok_mark());
            }
        }
    }
    Ok(())
}

fn cmd_minify(input: &Path, output: &Path, level1_only: bool) -> Result<()> {
    let config = if level1_only {
        MinifierConfig::level1_only()
    } else {
        MinifierConfig::full()
    };
    let outcome = MinificationAdapter::new(config)
        .minify_file(input, output)
        .with_context(|| format!("minify {:?}", input))?;

    println!(
        "{} {} -> {}",
        ok_mark(),
        input.display(),
        output.display()
    );
    println!(
        "  {} -> {} bytes ({} saved, {:.1}%)",
        outcome.original_size, outcome.minified_size, outcome.savings, outcome.percentage
    );
    println!(
        "  {} -> {} lines in {}ms",
        outcome.stats.original_lines, outcome.stats.minified_lines, outcome.stats.duration_ms
    );
    for w in &outcome.warnings {
        println!("  {} {}", warn_mark(), w);
    }
    Ok(())
}

fn cmd_compare(original: &Path, optimized: &Path, format: Format) -> Result<()> {
    let cmp = compare_files(original, optimized)
        .with_context(|| format!("compare {:?} with {:?}", original, optimized))?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&cmp)?),
        Format::Text => {
            println!("{:<10} {:>10} {:>8}  {}", "", "bytes", "lines", "path");
            println!(
                "{:<10} {:>10} {:>8}  {}",
                "original",
                cmp.original.bytes,
                cmp.original.lines,
                cmp.original.path.display()
            );
            println!(
                "{:<10} {:>10} {:>8}  {}",
                "optimized",
                cmp.optimized.bytes,
                cmp.optimized.lines,
                cmp.optimized.path.display()
            );
            println!();
            println!(
                "Saved {} bytes ({:.1}%), {} lines",
                cmp.bytes_saved, cmp.percentage, cmp.lines_saved
            );
        }
    }
    Ok(())
}

fn cmd_validate(artifact: &Path, source: &Path, format: Format) -> Result<()> {
    let sheet = read_sheet(source)?;
    let report = validate_artifact(artifact, sheet.text())
        .with_context(|| format!("validate {:?}", artifact))?;

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Artifact: {} ({} bytes)", report.artifact.display(), report.bytes);
    println!("  custom properties: {}", yes_no(report.features.custom_properties));
    println!("  media queries:     {}", yes_no(report.features.media_queries));
    println!("  keyframes:         {}", yes_no(report.features.keyframes));
    println!("  !important:        {}", yes_no(report.features.important));
    println!();
    if report.is_clean() {
        println!("{} Artifact looks sane", ok_mark());
    }
    for w in &report.warnings {
        println!("{} {}", warn_mark(), w);
    }
    Ok(())
}

/// Defaults, then the config file, then `CSSPIPE_*` variables, then flags.
fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            PipelineConfig::from_file(path).with_context(|| format!("load config {:?}", path))?
        }
        None => PipelineConfig::default(),
    };
    config = config.with_env();

    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(source) = &args.source {
        config.source = source.clone();
    }
    if let Some(line) = &args.lint_cmd {
        config.lint = ToolCommand::shell(config.lint.name.clone(), line);
    }
    if let Some(line) = &args.build_dev_cmd {
        config.build_dev = ToolCommand::shell(config.build_dev.name.clone(), line);
    }
    if let Some(line) = &args.build_prod_cmd {
        config.build_prod = ToolCommand::shell(config.build_prod.name.clone(), line);
    }
    if let Some(line) = &args.visual_cmd {
        config.visual_test = ToolCommand::shell(config.visual_test.name.clone(), line);
    }
    if let Some(path) = &args.purge_report {
        config.purge_rejected_report = Some(path.clone());
    }
    Ok(config)
}

fn print_transition(stage: PipelineStage, status: StageStatus, record: Option<&StageRecord>) {
    let Some(record) = record else {
        debug!(stage = %stage, status = %status, "Stage transition");
        return;
    };
    let mark = match status {
        StageStatus::Ok => ok_mark(),
        StageStatus::Warning => warn_mark(),
        StageStatus::Fatal => fail_mark(),
        StageStatus::Pending | StageStatus::Running => return,
    };
    let detail = record.message.as_deref().unwrap_or_default();
    println!(
        "  {} {:<10} {:>6}ms  {}",
        mark,
        stage.name(),
        record.duration_ms,
        detail.if_supports_color(Stdout, |t| t.dimmed())
    );
    if status == StageStatus::Fatal {
        if let Some(output) = &record.output {
            for line in output.lines().take(20) {
                println!("      {}", line);
            }
        }
    }
}

fn print_summary(run: &PipelineRun) {
    println!();
    println!("Run ID: {}", run.run_id);
    if let Some(backup) = &run.backup {
        println!(
            "Backup: {} (sha256 {})",
            backup.backup.display(),
            &backup.digest[..12.min(backup.digest.len())]
        );
    }
    if let Some(savings) = &run.savings {
        println!(
            "Size:   {} -> {} bytes ({} saved, {:.1}%)",
            savings.original.bytes,
            savings.final_artifact.bytes,
            savings.bytes_saved,
            savings.percentage
        );
        println!(
            "Lines:  {} -> {}",
            savings.original.lines, savings.final_artifact.lines
        );
    }
    println!(
        "Stages: {} ok, {} warning, {} fatal ({}ms)",
        run.count(StageStatus::Ok),
        run.count(StageStatus::Warning),
        run.count(StageStatus::Fatal),
        run.duration_ms()
    );
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    println!(
        "{} {}",
        "Running csspipe for".if_supports_color(Stdout, |t| t.bold()),
        config.source_path().display()
    );
    println!();

    let mut pipeline = Pipeline::new(config).on_transition(Box::new(print_transition));
    if args.level1_only {
        pipeline = pipeline.with_minifier(MinifierConfig::level1_only());
    }
    let run = pipeline.run().await;
    print_summary(&run);

    match run.fatal_stage() {
        None if run.success => {
            println!("\n{} Pipeline completed", ok_mark());
            Ok(())
        }
        Some(stage) => anyhow::bail!("pipeline aborted at stage {}", stage),
        None => anyhow::bail!("pipeline did not complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    const CSS: &str = ":root{--a:1}\n.btn{color:red}\n.btn{color:red}\n@media print{.btn{display:none}}\n";

    fn write_css(dir: &Path) -> PathBuf {
        let path = dir.join("style.css");
        std::fs::write(&path, CSS).expect("write css");
        path
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "csspipe",
            "--verbose",
            "run",
            "--lint-cmd",
            "true",
            "--level1-only",
        ])
        .expect("parse");
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.lint_cmd.as_deref(), Some("true"));
                assert!(args.level1_only);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("csspipe.json");
        std::fs::write(&config_path, r#"{"source":"from-file.css","dist_dir":"out"}"#)
            .expect("write");

        let args = RunArgs {
            root: Some(dir.path().to_path_buf()),
            config: Some(config_path),
            source: Some(PathBuf::from("from-flag.css")),
            lint_cmd: Some(String::new()),
            ..RunArgs::default()
        };
        let config = resolve_config(&args).expect("resolve");
        assert_eq!(config.source, PathBuf::from("from-flag.css"));
        assert_eq!(config.dist_dir, PathBuf::from("out"));
        assert_eq!(config.root, dir.path());
        assert!(!config.lint.enabled);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args = RunArgs {
            config: Some(PathBuf::from("/nonexistent/csspipe.json")),
            ..RunArgs::default()
        };
        let err = resolve_config(&args).unwrap_err();
        assert!(err.to_string().contains("load config"));
    }

    #[test]
    fn test_cmd_organize_writes_modules() {
        let dir = TempDir::new().expect("tempdir");
        let css = write_css(dir.path());
        let out = dir.path().join("modules");

        cmd_organize(&css, &out).expect("organize");
        assert!(out.join("_variables.css").is_file());
        assert!(out.join("_components.css").is_file());
        assert!(out.join("_responsive.css").is_file());
        assert!(out.join("style.css").is_file());
    }

    #[test]
    fn test_cmd_audit_writes_report_pair() {
        let dir = TempDir::new().expect("tempdir");
        let css = write_css(dir.path());
        let reports = dir.path().join("reports");

        cmd_audit(&css, Some(&reports), Format::Json).expect("audit");
        let raw = std::fs::read_to_string(reports.join("css-audit.json")).expect("read");
        let v: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(v["summary"]["duplicate_selectors"], 1);
        assert!(reports.join("css-audit.txt").is_file());
    }

    #[test]
    fn test_cmd_minify_and_compare() {
        let dir = TempDir::new().expect("tempdir");
        let css = write_css(dir.path());
        let out = dir.path().join("dist").join("style.min.css");

        cmd_minify(&css, &out, false).expect("minify");
        assert!(out.is_file());
        cmd_compare(&css, &out, Format::Text).expect("compare");
        cmd_validate(&out, &css, Format::Text).expect("validate");
    }

    #[test]
    fn test_cmd_tokenize_missing_file() {
        let err =
            cmd_tokenize(Path::new("/nonexistent/style.css"), Format::Text).unwrap_err();
        assert!(err.to_string().contains("read stylesheet"));
    }
}
