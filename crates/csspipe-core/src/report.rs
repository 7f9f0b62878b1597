//! Turns audit metrics into severity-bucketed issues and recommendations.
//!
//! Two artifacts come out of one [`AuditReport`]:
//! - [`GeneratedReport`]: structured, written as `css-audit.json`
//! - [`render_text`]: the same content as plain text (`css-audit.txt`)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditReport, CRITICAL_DUPLICATE_SELECTORS, CRITICAL_IMPORTANT_COUNT};
use crate::error::{Result, StyleError};

/// Headline numbers of an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_rules: usize,
    pub total_declarations: usize,
    pub unique_selectors: usize,
    pub duplicate_selectors: usize,
    pub duplicate_declarations: usize,
    pub obsolete_properties: usize,
    pub unnecessary_prefixes: usize,
    pub performance_issues: usize,
    pub important_count: usize,
    /// Percentage of declarations carrying `!important`.
    pub important_percentage: f64,
}

/// Issue strings grouped by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueBuckets {
    pub critical: Vec<String>,
    pub warning: Vec<String>,
    pub info: Vec<String>,
}

impl IssueBuckets {
    pub fn total(&self) -> usize {
        self.critical.len() + self.warning.len() + self.info.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub summary: AuditSummary,
    pub issues: IssueBuckets,
    pub recommendations: Vec<String>,
}

/// Build the structured report. Pure: same audit in, same report out.
pub fn generate(audit: &AuditReport) -> GeneratedReport {
    let summary = AuditSummary {
        total_rules: audit.total_rules,
        total_declarations: audit.total_declarations,
        unique_selectors: audit.unique_selectors,
        duplicate_selectors: audit.duplicate_selectors.len(),
        duplicate_declarations: audit.duplicate_declarations.len(),
        obsolete_properties: audit.obsolete_properties.len(),
        unnecessary_prefixes: audit.unnecessary_prefixes.len(),
        performance_issues: audit.performance_issues.len(),
        important_count: audit.important_usage.count,
        important_percentage: audit.important_usage.ratio * 100.0,
    };

    GeneratedReport {
        issues: bucket_issues(audit),
        recommendations: recommendations(audit),
        summary,
    }
}

fn bucket_issues(audit: &AuditReport) -> IssueBuckets {
    let mut issues = IssueBuckets::default();

    let duplicates = audit.duplicate_selectors.len();
    if duplicates > CRITICAL_DUPLICATE_SELECTORS {
        issues
            .critical
            .push(format!("{} duplicate selectors found", duplicates));
    } else if duplicates > 0 {
        issues
            .info
            .push(format!("{} duplicate selectors found", duplicates));
    }

    let important = &audit.important_usage;
    if important.count > CRITICAL_IMPORTANT_COUNT {
        issues.critical.push(format!(
            "Excessive !important usage: {} occurrences ({:.1}% of declarations)",
            important.count,
            important.ratio * 100.0
        ));
    } else if important.count > 0 {
        issues.info.push(format!(
            "!important used {} times ({:.1}% of declarations)",
            important.count,
            important.ratio * 100.0
        ));
    }

    if !audit.obsolete_properties.is_empty() {
        issues.warning.push(format!(
            "{} obsolete properties detected",
            audit.obsolete_properties.len()
        ));
    }
    if !audit.performance_issues.is_empty() {
        issues.warning.push(format!(
            "{} potentially expensive declarations (blur, drop-shadow, matrix3d)",
            audit.performance_issues.len()
        ));
    }

    if !audit.duplicate_declarations.is_empty() {
        issues.info.push(format!(
            "{} declarations repeated more than 3 times",
            audit.duplicate_declarations.len()
        ));
    }
    if !audit.unnecessary_prefixes.is_empty() {
        issues.info.push(format!(
            "{} unnecessary vendor prefixes",
            audit.unnecessary_prefixes.len()
        ));
    }
    if !audit.long_selectors.is_empty() {
        issues.info.push(format!(
            "{} selectors longer than 100 characters",
            audit.long_selectors.len()
        ));
    }
    if !audit.high_specificity.is_empty() {
        issues.info.push(format!(
            "{} selectors with specificity above 100",
            audit.high_specificity.len()
        ));
    }
    if !audit.media_query_issues.is_empty() {
        issues.info.push(format!(
            "{} media queries use device-width features",
            audit.media_query_issues.len()
        ));
    }

    issues
}

fn recommendations(audit: &AuditReport) -> Vec<String> {
    let library: [(bool, &str); 8] = [
        (
            !audit.duplicate_selectors.is_empty(),
            "Consolidate duplicate selectors into a single rule",
        ),
        (
            !audit.duplicate_declarations.is_empty(),
            "Extract frequently repeated declarations into utility classes",
        ),
        (
            audit.important_usage.count > 0,
            "Reduce !important usage by lowering selector specificity instead",
        ),
        (
            !audit.obsolete_properties.is_empty(),
            "Remove or replace obsolete properties (filter, zoom, behavior, expression)",
        ),
        (
            !audit.unnecessary_prefixes.is_empty(),
            "Drop vendor prefixes for border-radius, box-shadow, transition and transform",
        ),
        (
            !audit.performance_issues.is_empty(),
            "Review blur, drop-shadow and 3D transforms on frequently repainted elements",
        ),
        (
            !audit.long_selectors.is_empty() || !audit.high_specificity.is_empty(),
            "Simplify long or highly specific selectors, prefer single-class selectors",
        ),
        (
            !audit.media_query_issues.is_empty(),
            "Replace max-device-width/min-device-width with width-based media queries",
        ),
    ];

    library
        .iter()
        .filter(|(applies, _)| *applies)
        .map(|(_, text)| text.to_string())
        .collect()
}

/// Plain-text rendering with the same content as [`GeneratedReport`].
pub fn render_text(report: &GeneratedReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str("CSS AUDIT REPORT\n");
    out.push_str("================\n\n");
    out.push_str("Summary\n");
    out.push_str(&format!("  Rules:                  {}\n", s.total_rules));
    out.push_str(&format!("  Declarations:           {}\n", s.total_declarations));
    out.push_str(&format!("  Unique selectors:       {}\n", s.unique_selectors));
    out.push_str(&format!("  Duplicate selectors:    {}\n", s.duplicate_selectors));
    out.push_str(&format!("  Duplicate declarations: {}\n", s.duplicate_declarations));
    out.push_str(&format!("  Obsolete properties:    {}\n", s.obsolete_properties));
    out.push_str(&format!("  Unnecessary prefixes:   {}\n", s.unnecessary_prefixes));
    out.push_str(&format!("  Performance issues:     {}\n", s.performance_issues));
    out.push_str(&format!(
        "  !important:             {} ({:.1}%)\n\n",
        s.important_count, s.important_percentage
    ));

    for (title, items) in [
        ("Critical", &report.issues.critical),
        ("Warnings", &report.issues.warning),
        ("Info", &report.issues.info),
    ] {
        out.push_str(&format!("{} ({})\n", title, items.len()));
        for item in items {
            out.push_str(&format!("  - {}\n", item));
        }
        out.push('\n');
    }

    out.push_str("Recommendations\n");
    if report.recommendations.is_empty() {
        out.push_str("  (none)\n");
    }
    for (i, rec) in report.recommendations.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, rec));
    }
    out
}

/// Write `<stem>.json` and `<stem>.txt` side by side. Returns both paths.
pub fn write_report_pair(
    dir: &Path,
    stem: &str,
    report: &GeneratedReport,
) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    std::fs::create_dir_all(dir).map_err(|e| StyleError::io(dir, e))?;
    let json_path = dir.join(format!("{}.json", stem));
    let text_path = dir.join(format!("{}.txt", stem));

    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(&json_path, content).map_err(|e| StyleError::io(&json_path, e))?;
    std::fs::write(&text_path, render_text(report)).map_err(|e| StyleError::io(&text_path, e))?;
    Ok((json_path, text_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::audit_stylesheet;
    use crate::source::RawStylesheet;

    fn report_for(css: &str) -> GeneratedReport {
        generate(&audit_stylesheet(&RawStylesheet::from_text(css)).expect("audit"))
    }

    #[test]
    fn test_clean_stylesheet_has_no_issues_or_recommendations() {
        let report = report_for(".a{color:red} .b{margin:0}");
        assert_eq!(report.issues.total(), 0);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.summary.total_rules, 2);
    }

    #[test]
    fn test_recommendations_are_gated_by_findings() {
        let report = report_for(".a{color:red} .a{margin:0}");
        assert_eq!(
            report.recommendations,
            vec!["Consolidate duplicate selectors into a single rule".to_string()]
        );
        assert_eq!(report.issues.info, vec!["1 duplicate selectors found".to_string()]);
    }

    #[test]
    fn test_obsolete_and_performance_are_warnings() {
        let report = report_for(".a{filter:blur(2px)}");
        assert_eq!(report.issues.warning.len(), 2);
        assert!(report.issues.critical.is_empty());
    }

    #[test]
    fn test_text_rendering_mirrors_structure() {
        let report = report_for(".a{zoom:1} .a{color:red !important}");
        let text = render_text(&report);
        assert!(text.starts_with("CSS AUDIT REPORT"));
        assert!(text.contains("Warnings (1)"));
        assert!(text.contains("1 obsolete properties detected"));
        for rec in &report.recommendations {
            assert!(text.contains(rec.as_str()));
        }
    }

    #[test]
    fn test_write_report_pair() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let report = report_for(".a{color:red}");
        let (json, text) = write_report_pair(dir.path(), "css-audit", &report).expect("write");
        assert!(json.ends_with("css-audit.json"));
        assert!(text.ends_with("css-audit.txt"));

        let raw = std::fs::read_to_string(json).expect("read");
        let back: GeneratedReport = serde_json::from_str(&raw).expect("parse");
        assert_eq!(back, report);
    }
}
