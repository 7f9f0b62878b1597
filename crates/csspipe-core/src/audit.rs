//! Metrics-driven stylesheet audit.
//!
//! The audit walks a [`StylesheetTree`] by folding an immutable
//! [`AuditAccumulator`] over its nodes; every visit consumes the accumulator
//! and returns the next one. Thresholds are fixed constants.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::RawStylesheet;
use crate::tree::{
    parse_stylesheet, AtRule, AtRuleBlock, Declaration, Node, StyleRule, StylesheetTree,
};

/// Selectors longer than this many characters are reported.
pub const LONG_SELECTOR_CHARS: usize = 100;
/// Specificity scores above this are reported.
pub const HIGH_SPECIFICITY: u32 = 100;
/// A `(property, value)` pair seen more often than this is reported.
pub const DUPLICATE_DECLARATION_MIN: usize = 3;
/// More duplicated selectors than this is critical.
pub const CRITICAL_DUPLICATE_SELECTORS: usize = 10;
/// More `!important` occurrences than this is critical.
pub const CRITICAL_IMPORTANT_COUNT: usize = 50;

pub const OBSOLETE_PROPERTIES: &[&str] = &[
    "filter",
    "zoom",
    "-ms-filter",
    "behavior",
    "expression",
    "-moz-binding",
    "-webkit-box-reflect",
];

pub const UNNECESSARY_PREFIXES: &[&str] = &[
    "-webkit-border-radius",
    "-moz-border-radius",
    "-o-border-radius",
    "-webkit-box-shadow",
    "-moz-box-shadow",
    "-o-box-shadow",
    "-webkit-transition",
    "-moz-transition",
    "-o-transition",
    "-webkit-transform",
    "-moz-transform",
    "-o-transform",
];

const EXPENSIVE_PROPERTIES: &[&str] = &["box-shadow", "filter", "transform"];
const EXPENSIVE_TOKENS: &[&str] = &["blur(", "drop-shadow(", "matrix3d("];
const DEVICE_WIDTH_FEATURES: &[&str] = &["max-device-width", "min-device-width"];

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    DuplicateSelector,
    DuplicateDeclaration,
    ObsoleteProperty,
    UnnecessaryPrefix,
    PerformanceRisk,
    LongSelector,
    HighSpecificity,
    ImportantOveruse,
    MediaQueryAntipattern,
}

/// Supporting evidence attached to a finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Threshold that was crossed, when the finding is threshold-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub category: FindingCategory,
    pub severity: Severity,
    pub message: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCount {
    pub selector: String,
    pub count: usize,
    /// Enclosing at-rule prelude, e.g. `@media (max-width: 600px)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationCount {
    pub property: String,
    pub value: String,
    pub count: usize,
}

/// A selector with the metric that flagged it (length or specificity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorMetric {
    pub selector: String,
    pub value: u64,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUse {
    pub selector: String,
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceIssue {
    pub selector: String,
    pub property: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaQueryIssue {
    pub query: String,
    pub reason: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantUsage {
    pub count: usize,
    /// Occurrences divided by total declarations.
    pub ratio: f64,
    pub severity: Severity,
}

/// Aggregate result of one audit pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total_rules: usize,
    pub total_declarations: usize,
    pub total_at_rules: usize,
    pub unique_selectors: usize,
    pub duplicate_selectors: Vec<SelectorCount>,
    pub duplicate_declarations: Vec<DeclarationCount>,
    pub long_selectors: Vec<SelectorMetric>,
    pub high_specificity: Vec<SelectorMetric>,
    pub obsolete_properties: Vec<PropertyUse>,
    pub unnecessary_prefixes: Vec<PropertyUse>,
    pub performance_issues: Vec<PerformanceIssue>,
    pub media_query_issues: Vec<MediaQueryIssue>,
    pub important_usage: ImportantUsage,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    /// Findings of one severity, in discovery order.
    pub fn findings_with(&self, severity: Severity) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }

    /// Findings of one category, in discovery order.
    pub fn findings_in(&self, category: FindingCategory) -> impl Iterator<Item = &AuditFinding> {
        self.findings.iter().filter(move |f| f.category == category)
    }
}

/// Crude textual specificity: `100 × ids + 10 × classes + element names`.
///
/// `#` and `.` markers are counted anywhere in the text; element names are
/// identifiers that start a compound selector (after the start, whitespace,
/// a combinator, a comma or an opening parenthesis).
pub fn specificity(selector: &str) -> u32 {
    let mut ids = 0u32;
    let mut classes = 0u32;
    let mut elements = 0u32;
    let mut at_boundary = true;

    for c in selector.chars() {
        match c {
            '#' => ids += 1,
            '.' => classes += 1,
            c if at_boundary && c.is_ascii_alphabetic() => elements += 1,
            _ => {}
        }
        at_boundary = matches!(c, ' ' | '\t' | '\n' | '>' | '+' | '~' | ',' | '(');
    }

    100 * ids + 10 * classes + elements
}

/// Walk state threaded through the audit fold.
#[derive(Debug, Clone, Default)]
pub struct AuditAccumulator {
    total_rules: usize,
    total_declarations: usize,
    total_at_rules: usize,
    selectors: Vec<SelectorCount>,
    selector_index: HashMap<(Option<String>, String), usize>,
    declarations: Vec<DeclarationCount>,
    declaration_index: HashMap<(String, String), usize>,
    long_selectors: Vec<SelectorMetric>,
    high_specificity: Vec<SelectorMetric>,
    obsolete_properties: Vec<PropertyUse>,
    unnecessary_prefixes: Vec<PropertyUse>,
    performance_issues: Vec<PerformanceIssue>,
    media_query_issues: Vec<MediaQueryIssue>,
}

impl AuditAccumulator {
    fn visit_nodes(self, nodes: &[Node], context: Option<&str>) -> Self {
        nodes.iter().fold(self, |acc, node| match node {
            Node::Rule(rule) => acc.visit_rule(rule, context),
            Node::AtRule(at) => acc.visit_at_rule(at),
        })
    }

    fn visit_rule(mut self, rule: &StyleRule, context: Option<&str>) -> Self {
        let selector = rule.selector_text();
        self.total_rules += 1;

        let key = (context.map(str::to_string), selector.clone());
        match self.selector_index.get(&key) {
            Some(&idx) => self.selectors[idx].count += 1,
            None => {
                self.selector_index.insert(key, self.selectors.len());
                self.selectors.push(SelectorCount {
                    selector: selector.clone(),
                    count: 1,
                    context: context.map(str::to_string),
                });
            }
        }

        let length = selector.chars().count();
        if length > LONG_SELECTOR_CHARS {
            self.long_selectors.push(SelectorMetric {
                selector: selector.clone(),
                value: length as u64,
                line: rule.line,
            });
        }

        let score = specificity(&selector);
        if score > HIGH_SPECIFICITY {
            self.high_specificity.push(SelectorMetric {
                selector: selector.clone(),
                value: u64::from(score),
                line: rule.line,
            });
        }

        self.visit_declarations(&selector, &rule.declarations)
    }

    fn visit_at_rule(mut self, at: &AtRule) -> Self {
        self.total_at_rules += 1;

        if at.name == "media" {
            let query = at.prelude.to_ascii_lowercase();
            if let Some(feature) = DEVICE_WIDTH_FEATURES.iter().find(|f| query.contains(*f)) {
                self.media_query_issues.push(MediaQueryIssue {
                    query: at.prelude.clone(),
                    reason: format!("{} targets the device, not the viewport; use width-based queries", feature),
                    line: at.line,
                });
            }
        }

        let owner = format!("@{} {}", at.name, at.prelude).trim_end().to_string();
        match &at.block {
            AtRuleBlock::None => self,
            AtRuleBlock::Rules(children) => self.visit_nodes(children, Some(&owner)),
            AtRuleBlock::Frames(frames) => frames.iter().fold(self, |acc, frame| {
                acc.visit_declarations(&format!("{} {}", owner, frame.selector), &frame.declarations)
            }),
            AtRuleBlock::Declarations(declarations) => self.visit_declarations(&owner, declarations),
        }
    }

    fn visit_declarations(self, owner: &str, declarations: &[Declaration]) -> Self {
        declarations
            .iter()
            .fold(self, |acc, declaration| acc.visit_declaration(owner, declaration))
    }

    fn visit_declaration(mut self, owner: &str, declaration: &Declaration) -> Self {
        self.total_declarations += 1;
        let property = declaration.property.as_str();
        let value = declaration.value.as_str();

        let key = (property.to_string(), value.to_string());
        match self.declaration_index.get(&key) {
            Some(&idx) => self.declarations[idx].count += 1,
            None => {
                self.declaration_index.insert(key, self.declarations.len());
                self.declarations.push(DeclarationCount {
                    property: property.to_string(),
                    value: value.to_string(),
                    count: 1,
                });
            }
        }

        let usage = || PropertyUse {
            selector: owner.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        };

        if OBSOLETE_PROPERTIES.contains(&property) {
            self.obsolete_properties.push(usage());
        }
        if UNNECESSARY_PREFIXES.contains(&property) {
            self.unnecessary_prefixes.push(usage());
        }
        if EXPENSIVE_PROPERTIES.contains(&property) {
            let lowered = value.to_ascii_lowercase();
            if EXPENSIVE_TOKENS.iter().any(|token| lowered.contains(token)) {
                self.performance_issues.push(PerformanceIssue {
                    selector: owner.to_string(),
                    property: property.to_string(),
                    value: value.to_string(),
                    reason: performance_reason(property).to_string(),
                });
            }
        }

        self
    }

    /// Close the walk and derive findings.
    fn finish(self, important_count: usize) -> AuditReport {
        let unique_selectors = self.selectors.len();
        let duplicate_selectors: Vec<SelectorCount> =
            self.selectors.into_iter().filter(|s| s.count > 1).collect();
        let duplicate_declarations: Vec<DeclarationCount> = self
            .declarations
            .into_iter()
            .filter(|d| d.count > DUPLICATE_DECLARATION_MIN)
            .collect();

        let ratio = if self.total_declarations == 0 {
            0.0
        } else {
            important_count as f64 / self.total_declarations as f64
        };
        let important_usage = ImportantUsage {
            count: important_count,
            ratio,
            severity: if important_count > CRITICAL_IMPORTANT_COUNT {
                Severity::Critical
            } else {
                Severity::Info
            },
        };

        let mut report = AuditReport {
            total_rules: self.total_rules,
            total_declarations: self.total_declarations,
            total_at_rules: self.total_at_rules,
            unique_selectors,
            duplicate_selectors,
            duplicate_declarations,
            long_selectors: self.long_selectors,
            high_specificity: self.high_specificity,
            obsolete_properties: self.obsolete_properties,
            unnecessary_prefixes: self.unnecessary_prefixes,
            performance_issues: self.performance_issues,
            media_query_issues: self.media_query_issues,
            important_usage,
            findings: Vec::new(),
        };
        report.findings = derive_findings(&report);
        report
    }
}

fn performance_reason(property: &str) -> &'static str {
    match property {
        "box-shadow" => "large blurred or inset box-shadows are repainted on every frame they change",
        "filter" => "blur and drop-shadow filters force costly offscreen rendering",
        "transform" => "matrix3d transforms promote layers and increase GPU memory use",
        _ => "expensive to render",
    }
}

fn derive_findings(report: &AuditReport) -> Vec<AuditFinding> {
    let mut findings = Vec::new();

    let duplicate_severity = if report.duplicate_selectors.len() > CRITICAL_DUPLICATE_SELECTORS {
        Severity::Critical
    } else {
        Severity::Info
    };
    for dup in &report.duplicate_selectors {
        findings.push(AuditFinding {
            category: FindingCategory::DuplicateSelector,
            severity: duplicate_severity,
            message: format!("selector `{}` is declared {} times", dup.selector, dup.count),
            evidence: Evidence {
                selector: Some(dup.selector.clone()),
                count: Some(dup.count),
                ..Evidence::default()
            },
        });
    }

    for dup in &report.duplicate_declarations {
        findings.push(AuditFinding {
            category: FindingCategory::DuplicateDeclaration,
            severity: Severity::Info,
            message: format!(
                "`{}: {}` repeated {} times; candidate for a utility class",
                dup.property, dup.value, dup.count
            ),
            evidence: Evidence {
                property: Some(dup.property.clone()),
                value: Some(dup.value.clone()),
                count: Some(dup.count),
                threshold: Some(DUPLICATE_DECLARATION_MIN as u64),
                ..Evidence::default()
            },
        });
    }

    for hit in &report.obsolete_properties {
        findings.push(property_finding(
            FindingCategory::ObsoleteProperty,
            Severity::Warning,
            format!("obsolete property `{}` in `{}`", hit.property, hit.selector),
            hit,
        ));
    }

    for hit in &report.unnecessary_prefixes {
        findings.push(property_finding(
            FindingCategory::UnnecessaryPrefix,
            Severity::Info,
            format!("vendor prefix `{}` is no longer needed in `{}`", hit.property, hit.selector),
            hit,
        ));
    }

    for issue in &report.performance_issues {
        findings.push(AuditFinding {
            category: FindingCategory::PerformanceRisk,
            severity: Severity::Warning,
            message: format!("`{}: {}` in `{}`: {}", issue.property, issue.value, issue.selector, issue.reason),
            evidence: Evidence {
                selector: Some(issue.selector.clone()),
                property: Some(issue.property.clone()),
                value: Some(issue.value.clone()),
                ..Evidence::default()
            },
        });
    }

    for long in &report.long_selectors {
        findings.push(metric_finding(
            FindingCategory::LongSelector,
            format!("selector is {} characters long", long.value),
            long,
            LONG_SELECTOR_CHARS as u64,
        ));
    }

    for high in &report.high_specificity {
        findings.push(metric_finding(
            FindingCategory::HighSpecificity,
            format!("selector `{}` has specificity {}", high.selector, high.value),
            high,
            u64::from(HIGH_SPECIFICITY),
        ));
    }

    let important = &report.important_usage;
    if important.count > 0 {
        findings.push(AuditFinding {
            category: FindingCategory::ImportantOveruse,
            severity: important.severity,
            message: format!(
                "!important used {} times ({:.1}% of declarations)",
                important.count,
                important.ratio * 100.0
            ),
            evidence: Evidence {
                count: Some(important.count),
                threshold: Some(CRITICAL_IMPORTANT_COUNT as u64),
                ..Evidence::default()
            },
        });
    }

    for issue in &report.media_query_issues {
        findings.push(AuditFinding {
            category: FindingCategory::MediaQueryAntipattern,
            severity: Severity::Info,
            message: format!("@media {}: {}", issue.query, issue.reason),
            evidence: Evidence {
                value: Some(issue.query.clone()),
                line: Some(issue.line),
                ..Evidence::default()
            },
        });
    }

    findings
}

fn property_finding(
    category: FindingCategory,
    severity: Severity,
    message: String,
    hit: &PropertyUse,
) -> AuditFinding {
    AuditFinding {
        category,
        severity,
        message,
        evidence: Evidence {
            selector: Some(hit.selector.clone()),
            property: Some(hit.property.clone()),
            value: Some(hit.value.clone()),
            ..Evidence::default()
        },
    }
}

fn metric_finding(
    category: FindingCategory,
    message: String,
    metric: &SelectorMetric,
    threshold: u64,
) -> AuditFinding {
    AuditFinding {
        category,
        severity: Severity::Info,
        message,
        evidence: Evidence {
            selector: Some(metric.selector.clone()),
            count: Some(metric.value as usize),
            threshold: Some(threshold),
            line: Some(metric.line),
            ..Evidence::default()
        },
    }
}

/// Audit an already-parsed tree. `source` is used for whole-document text
/// metrics (`!important` occurrences).
pub fn audit(source: &str, tree: &StylesheetTree) -> AuditReport {
    let important_count = source.matches("!important").count();
    AuditAccumulator::default()
        .visit_nodes(&tree.nodes, None)
        .finish(important_count)
}

/// Parse and audit a stylesheet.
pub fn audit_stylesheet(sheet: &RawStylesheet) -> Result<AuditReport> {
    let tree = parse_stylesheet(sheet.text())?;
    let report = audit(sheet.text(), &tree);
    tracing::info!(
        rules = report.total_rules,
        declarations = report.total_declarations,
        findings = report.findings.len(),
        "audit complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit_css(css: &str) -> AuditReport {
        audit_stylesheet(&RawStylesheet::from_text(css)).expect("audit")
    }

    #[test]
    fn test_specificity_heuristic() {
        assert_eq!(specificity("a"), 1);
        assert_eq!(specificity(".a"), 10);
        assert_eq!(specificity("#a"), 100);
        assert_eq!(specificity("#nav ul > li.item:hover"), 100 + 10 + 2);
        assert_eq!(specificity("div, p"), 2);
    }

    #[test]
    fn test_duplicate_selectors_counted_per_context() {
        let report = audit_css(".a{color:red} .a{margin:0} @media print{.a{color:black}}");
        assert_eq!(report.total_rules, 3);
        assert_eq!(report.duplicate_selectors.len(), 1);
        assert_eq!(report.duplicate_selectors[0].count, 2);
        assert_eq!(report.duplicate_selectors[0].context, None);
    }

    #[test]
    fn test_duplicate_selector_severity_escalates() {
        let css: String = (0..11).map(|i| format!(".s{i}{{color:red}} .s{i}{{margin:0}}")).collect();
        let report = audit_css(&css);
        assert_eq!(report.duplicate_selectors.len(), 11);
        assert!(report
            .findings_in(FindingCategory::DuplicateSelector)
            .all(|f| f.severity == Severity::Critical));

        let small = audit_css(".a{color:red} .a{margin:0}");
        let findings: Vec<_> = small.findings_in(FindingCategory::DuplicateSelector).collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
    }

    #[test]
    fn test_duplicate_declarations_need_more_than_three() {
        let three = audit_css(".a{color:red} .b{color:red} .c{color:red}");
        assert!(three.duplicate_declarations.is_empty());

        let four = audit_css(".a{color:red} .b{color:red} .c{color:red} .d{color:red}");
        assert_eq!(four.duplicate_declarations.len(), 1);
        assert_eq!(four.duplicate_declarations[0].count, 4);
    }

    #[test]
    fn test_prefixes_and_long_selectors() {
        let long = format!(".{} {{ color: red }}", "x".repeat(120));
        let css = format!(".a {{ -webkit-border-radius: 4px; border-radius: 4px }} {}", long);
        let report = audit_css(&css);
        assert_eq!(report.unnecessary_prefixes.len(), 1);
        assert_eq!(report.unnecessary_prefixes[0].property, "-webkit-border-radius");
        assert_eq!(report.long_selectors.len(), 1);
        assert_eq!(report.long_selectors[0].value, 121);
    }

    #[test]
    fn test_high_specificity() {
        let report = audit_css("#main .card{color:red} #main{color:blue}");
        assert_eq!(report.high_specificity.len(), 1);
        assert_eq!(report.high_specificity[0].selector, "#main .card");
        assert_eq!(report.high_specificity[0].value, 110);
    }

    #[test]
    fn test_performance_reason_is_property_specific() {
        let report = audit_css(".a{transform:matrix3d(1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1)} .b{box-shadow:0 0 4px red}");
        assert_eq!(report.performance_issues.len(), 1);
        assert!(report.performance_issues[0].reason.contains("matrix3d"));
    }

    #[test]
    fn test_device_width_media_query() {
        let report = audit_css("@media (max-device-width: 480px) { .a { color: red } } @media (max-width: 480px) { .b{color:red} }");
        assert_eq!(report.media_query_issues.len(), 1);
        assert_eq!(report.total_at_rules, 2);
        assert_eq!(report.total_rules, 2);
    }

    #[test]
    fn test_keyframe_frames_do_not_count_as_selectors() {
        let report = audit_css("@keyframes a{from{opacity:0}to{opacity:1}} @keyframes b{from{opacity:0}to{opacity:1}}");
        assert_eq!(report.total_rules, 0);
        assert!(report.duplicate_selectors.is_empty());
        assert_eq!(report.total_declarations, 4);
    }

    #[test]
    fn test_important_ratio_and_info_severity() {
        let report = audit_css(".a{color:red !important; margin:0}");
        assert_eq!(report.important_usage.count, 1);
        assert!((report.important_usage.ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.important_usage.severity, Severity::Info);
    }

    #[test]
    fn test_empty_stylesheet() {
        let report = audit_css("");
        assert_eq!(report.total_rules, 0);
        assert_eq!(report.important_usage.ratio, 0.0);
        assert!(report.findings.is_empty());
    }
}
