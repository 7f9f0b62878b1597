//! csspipe Core Library
//!
//! Stylesheet tokenizing, module classification, auditing, reporting and
//! minification. The pipeline crate sequences these into a build.

pub mod audit;
pub mod classify;
pub mod error;
pub mod minify;
pub mod modules;
pub mod report;
pub mod source;
pub mod telemetry;
pub mod tokenizer;
pub mod tree;

pub use audit::{
    audit, audit_stylesheet, specificity, AuditAccumulator, AuditFinding, AuditReport,
    FindingCategory, Severity,
};
pub use classify::{classify, ClassifierTable, ModuleName, ModuleSet, DEFAULT_MODULE};
pub use error::{Result, StyleError};
pub use minify::{
    compare_files, FileComparison, LightningEngine, MinificationAdapter, MinifierConfig,
    MinifyEngine, MinifyError, MinifyOutcome,
};
pub use modules::{write_modules, WrittenFile, AGGREGATOR_FILE};
pub use report::{generate, render_text, GeneratedReport, IssueBuckets};
pub use source::{count_lines, RawStylesheet, TextStats};
pub use telemetry::init_tracing;
pub use tokenizer::{tokenize, Rule, Span};
pub use tree::{parse_stylesheet, Node, StylesheetTree};
