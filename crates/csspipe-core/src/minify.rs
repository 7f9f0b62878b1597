//! Minification through an external engine, plus byte/line comparisons.
//!
//! [`MinificationAdapter`] owns a [`MinifierConfig`] and a [`MinifyEngine`].
//! Level-1 value transforms run as a text pre-pass before the engine sees the
//! input; level-2 structural merging is delegated to the engine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::source::count_lines;
use crate::tokenizer::mask_non_code;

#[derive(Debug, thiserror::Error)]
pub enum MinifyError {
    #[error("minifier reported {} error(s): {}", errors.len(), errors.join("; "))]
    Engine { errors: Vec<String> },

    #[error("minifier produced no output from {input_bytes} bytes containing declarations")]
    EmptyOutput { input_bytes: usize },

    #[error("level-1 pre-pass broke the stylesheet: {}", warnings.join("; "))]
    Prepass { warnings: Vec<String> },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Properties kept for mobile browsers even when the engine considers them redundant.
pub const MOBILE_PRESERVED_PROPERTIES: &[&str] = &[
    "-webkit-overflow-scrolling",
    "-webkit-tap-highlight-color",
    "-webkit-touch-callout",
    "touch-action",
];

/// Local, value-level transforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level1Options {
    /// Keep only the first `@charset` rule.
    pub remove_duplicate_charset: bool,
    /// Collapse redundant whitespace inside `linear-gradient()` values.
    pub collapse_gradient_whitespace: bool,
    /// Compact printing: whitespace removal plus URL and quote normalization.
    pub remove_whitespace: bool,
}

impl Default for Level1Options {
    fn default() -> Self {
        Self {
            remove_duplicate_charset: true,
            collapse_gradient_whitespace: true,
            remove_whitespace: true,
        }
    }
}

/// Structural merges.
///
/// Semantic merging and unused at-rule removal are never enabled, since
/// `@keyframes` can be referenced from markup or scripts the engine cannot see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Options {
    pub merge_adjacent_rules: bool,
    pub merge_non_adjacent_rules: bool,
    pub remove_duplicate_rules: bool,
    pub remove_duplicate_media_blocks: bool,
}

impl Default for Level2Options {
    fn default() -> Self {
        Self {
            merge_adjacent_rules: true,
            merge_non_adjacent_rules: true,
            remove_duplicate_rules: true,
            remove_duplicate_media_blocks: true,
        }
    }
}

impl Level2Options {
    fn any(&self) -> bool {
        self.merge_adjacent_rules
            || self.merge_non_adjacent_rules
            || self.remove_duplicate_rules
            || self.remove_duplicate_media_blocks
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinifierConfig {
    pub level1: Level1Options,
    /// `None` runs level 1 only.
    pub level2: Option<Level2Options>,
    pub preserve_properties: Vec<String>,
}

impl Default for MinifierConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl MinifierConfig {
    pub fn level1_only() -> Self {
        Self {
            level1: Level1Options::default(),
            level2: None,
            preserve_properties: MOBILE_PRESERVED_PROPERTIES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    pub fn full() -> Self {
        Self {
            level2: Some(Level2Options::default()),
            ..Self::level1_only()
        }
    }

    pub fn structural_pass(&self) -> bool {
        self.level2.as_ref().is_some_and(Level2Options::any)
    }
}

/// What an engine hands back for one input.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub code: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// An external minifier.
pub trait MinifyEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minify already pre-processed text. Errors are reported in
    /// [`EngineOutput::errors`], not by panicking or aborting.
    fn run(&self, css: &str, config: &MinifierConfig) -> EngineOutput;
}

/// lightningcss-backed engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightningEngine;

impl MinifyEngine for LightningEngine {
    fn name(&self) -> &'static str {
        "lightningcss"
    }

    fn run(&self, css: &str, config: &MinifierConfig) -> EngineOutput {
        let recovered = Arc::new(RwLock::new(Vec::new()));
        let mut output = EngineOutput::default();

        let mut sheet = match StyleSheet::parse(
            css,
            ParserOptions {
                error_recovery: true,
                warnings: Some(recovered.clone()),
                ..ParserOptions::default()
            },
        ) {
            Ok(sheet) => sheet,
            Err(e) => {
                output.errors.push(e.to_string());
                return output;
            }
        };

        if config.structural_pass() {
            if let Err(e) = sheet.minify(MinifyOptions::default()) {
                output.errors.push(e.to_string());
                return output;
            }
        }

        match sheet.to_css(PrinterOptions {
            minify: config.level1.remove_whitespace,
            ..PrinterOptions::default()
        }) {
            Ok(printed) => output.code = printed.code,
            Err(e) => output.errors.push(e.to_string()),
        }

        if let Ok(list) = recovered.read() {
            output.warnings = list.iter().map(|w| w.to_string()).collect();
        }
        output
    }
}

/// Size and line statistics of one minification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinifyStats {
    pub engine: String,
    pub original_lines: usize,
    pub minified_lines: usize,
    pub duration_ms: u64,
    pub structural_pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinifyOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub minified_size: u64,
    /// Bytes saved; negative when the output grew.
    pub savings: i64,
    pub percentage: f64,
    pub stats: MinifyStats,
    pub warnings: Vec<String>,
}

pub struct MinificationAdapter {
    config: MinifierConfig,
    engine: Box<dyn MinifyEngine>,
}

impl Default for MinificationAdapter {
    fn default() -> Self {
        Self::new(MinifierConfig::default())
    }
}

impl MinificationAdapter {
    pub fn new(config: MinifierConfig) -> Self {
        Self::with_engine(config, Box::new(LightningEngine))
    }

    pub fn with_engine(config: MinifierConfig, engine: Box<dyn MinifyEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &MinifierConfig {
        &self.config
    }

    /// Minify text in memory. Returns the code and the warnings to log.
    ///
    /// Recovered parse problems already present in `css` are warnings. Ones
    /// introduced by the level-1 pre-pass, or an empty result from input
    /// that declares something, are errors.
    pub fn minify_text(&self, css: &str) -> Result<(String, Vec<String>), MinifyError> {
        let prepared = self.level1_prepass(css);
        let out = self.engine.run(&prepared, &self.config);
        if !out.errors.is_empty() {
            return Err(MinifyError::Engine { errors: out.errors });
        }
        if prepared != css && !out.warnings.is_empty() {
            let baseline = self.engine.run(css, &self.config);
            if out.warnings.len() > baseline.warnings.len() {
                return Err(MinifyError::Prepass {
                    warnings: out.warnings,
                });
            }
        }
        if out.code.trim().is_empty() && has_declarations(css) {
            return Err(MinifyError::EmptyOutput {
                input_bytes: css.len(),
            });
        }

        let mut warnings = out.warnings;
        for property in &self.config.preserve_properties {
            if declares_property(css, property) && !declares_property(&out.code, property) {
                warnings.push(format!("preserved property {} was removed by the engine", property));
            }
        }
        Ok((out.code, warnings))
    }

    /// Minify `input` into `output`, creating the output's parent directory.
    pub fn minify_file(&self, input: &Path, output: &Path) -> Result<MinifyOutcome, MinifyError> {
        let started = Instant::now();
        let css = std::fs::read_to_string(input).map_err(|source| MinifyError::Io {
            path: input.to_path_buf(),
            source,
        })?;

        let (code, warnings) = self.minify_text(&css)?;
        for w in &warnings {
            warn!(engine = self.engine.name(), input = %input.display(), "{}", w);
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MinifyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(output, &code).map_err(|source| MinifyError::Io {
            path: output.to_path_buf(),
            source,
        })?;

        let original_size = css.len() as u64;
        let minified_size = code.len() as u64;
        let savings = original_size as i64 - minified_size as i64;
        let outcome = MinifyOutcome {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            original_size,
            minified_size,
            savings,
            percentage: percent(savings, original_size),
            stats: MinifyStats {
                engine: self.engine.name().to_string(),
                original_lines: count_lines(&css),
                minified_lines: count_lines(&code),
                duration_ms: started.elapsed().as_millis() as u64,
                structural_pass: self.config.structural_pass(),
            },
            warnings,
        };

        info!(
            input = %input.display(),
            output = %output.display(),
            original = outcome.original_size,
            minified = outcome.minified_size,
            "minified ({:.1}% saved)",
            outcome.percentage
        );
        Ok(outcome)
    }

    fn level1_prepass(&self, css: &str) -> String {
        let mut text = css.to_string();
        if self.config.level1.remove_duplicate_charset {
            text = dedupe_charset(&text);
        }
        if self.config.level1.collapse_gradient_whitespace {
            text = collapse_gradient_whitespace(&text);
        }
        debug!(before = css.len(), after = text.len(), "level-1 pre-pass");
        text
    }
}

fn percent(saved: i64, original: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        saved as f64 / original as f64 * 100.0
    }
}

fn declares_property(css: &str, property: &str) -> bool {
    css.match_indices(property).any(|(idx, _)| {
        let before_ok = css[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '-'));
        let after = css[idx + property.len()..].trim_start();
        before_ok && after.starts_with(':')
    })
}

/// Drop every `@charset "...";` statement after the first. Text inside
/// comments and strings is never treated as a statement.
pub fn dedupe_charset(css: &str) -> String {
    let mask = mask_non_code(css);
    let mut out = String::with_capacity(css.len());
    let mut copied = 0usize;
    let mut from = 0usize;
    let mut seen = false;

    while let Some(found) = mask[from..].find("@charset") {
        let idx = from + found;
        let Some(semi) = mask[idx..].find(';') else {
            break;
        };
        let end = idx + semi + 1;
        if seen {
            out.push_str(&css[copied..idx]);
            copied = end;
        }
        seen = true;
        from = end;
    }
    out.push_str(&css[copied..]);
    out
}

/// Collapse whitespace runs inside `linear-gradient(...)` to single spaces and
/// drop spaces next to parentheses and commas. Strings and comments inside
/// the arguments are copied untouched.
pub fn collapse_gradient_whitespace(css: &str) -> String {
    const MARKER: &str = "linear-gradient(";
    let mask = mask_non_code(css);
    let mut out = String::with_capacity(css.len());
    let mut copied = 0usize;
    let mut from = 0usize;

    while let Some(found) = mask[from..].find(MARKER) {
        let open = from + found + MARKER.len();
        let Some(close) = matching_paren(&mask[open..]).map(|c| open + c) else {
            break;
        };
        out.push_str(&css[copied..open]);
        out.push_str(&compact_args(&css[open..close], &mask[open..close]));
        copied = close;
        from = close;
    }
    out.push_str(&css[copied..]);
    out
}

/// Offset of the `)` closing an already opened parenthesis.
fn matching_paren(masked: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `mask` is the code mask of `args`; only unmasked whitespace is collapsed.
fn compact_args(args: &str, mask: &str) -> String {
    let code = mask.as_bytes();
    let mut out = String::with_capacity(args.len());
    let mut pending_space = false;
    for (i, c) in args.char_indices() {
        let m = code[i];
        if m.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space
            && !out.is_empty()
            && !matches!(m, b',' | b')' | b'(')
            && !out.ends_with(&[',', '('][..])
        {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// True when `css` holds at least one declaration outside comments and strings.
fn has_declarations(css: &str) -> bool {
    let mask = mask_non_code(css);
    let mut rest = mask.as_str();
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        let end = rest.find(&['{', '}'][..]).unwrap_or(rest.len());
        if rest[..end].contains(':') {
            return true;
        }
        rest = &rest[end..];
    }
    false
}

/// Byte and line counts of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub bytes: u64,
    pub lines: usize,
}

impl FileStats {
    pub fn read(path: &Path) -> Result<Self, MinifyError> {
        let text = std::fs::read_to_string(path).map_err(|source| MinifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes: text.len() as u64,
            lines: count_lines(&text),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileComparison {
    pub original: FileStats,
    pub optimized: FileStats,
    pub bytes_saved: i64,
    pub lines_saved: i64,
    pub percentage: f64,
}

/// Compare two arbitrary files by size and line count.
pub fn compare_files(original: &Path, optimized: &Path) -> Result<FileComparison, MinifyError> {
    let original = FileStats::read(original)?;
    let optimized = FileStats::read(optimized)?;
    let bytes_saved = original.bytes as i64 - optimized.bytes as i64;
    Ok(FileComparison {
        bytes_saved,
        lines_saved: original.lines as i64 - optimized.lines as i64,
        percentage: percent(bytes_saved, original.bytes),
        original,
        optimized,
    })
}
