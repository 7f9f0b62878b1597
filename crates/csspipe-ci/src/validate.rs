//! Structural sanity checks on the final artifact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Constructs whose presence is checked in a stylesheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub custom_properties: bool,
    pub media_queries: bool,
    pub keyframes: bool,
    pub important: bool,
}

impl FeatureSet {
    pub fn detect(css: &str) -> Self {
        Self {
            custom_properties: has_custom_property(css),
            media_queries: css.contains("@media"),
            keyframes: css.contains("keyframes"),
            important: css.contains("!important"),
        }
    }

    fn named(&self) -> [(&'static str, bool); 4] {
        [
            ("CSS custom properties", self.custom_properties),
            ("media queries", self.media_queries),
            ("keyframes", self.keyframes),
            ("!important declarations", self.important),
        ]
    }
}

fn has_custom_property(css: &str) -> bool {
    css.match_indices("--").any(|(idx, _)| {
        css[idx + 2..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    })
}

/// Result of a visual-regression run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualCheck {
    pub command: String,
    pub exit_code: i32,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub artifact: PathBuf,
    pub bytes: u64,
    pub source_features: FeatureSet,
    pub features: FeatureSet,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualCheck>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Record a visual regression command that could not be started.
    pub fn with_visual_error(mut self, command: &str, error: &StageError) -> Self {
        self.warnings
            .push(format!("visual regression check `{}` could not run: {}", command, error));
        self
    }

    /// Record a visual-regression result; a failure becomes a warning.
    pub fn with_visual(mut self, check: VisualCheck) -> Self {
        if !check.passed {
            self.warnings.push(format!(
                "visual regression check `{}` exited with code {}",
                check.command, check.exit_code
            ));
        }
        self.visual = Some(check);
        self
    }
}

/// Check `final_css` against the features of `source_css`.
pub fn validate_text(artifact: &Path, source_css: &str, final_css: &str) -> ValidationReport {
    let source_features = FeatureSet::detect(source_css);
    let features = FeatureSet::detect(final_css);

    let mut warnings = Vec::new();
    if final_css.trim().is_empty() {
        warnings.push("final artifact is empty".to_string());
    }
    let pairs = source_features.named().into_iter().zip(features.named());
    for ((name, in_source), (_, in_final)) in pairs {
        if in_source && !in_final {
            warnings.push(format!("{} present in the source are missing from the final artifact", name));
        }
    }

    ValidationReport {
        artifact: artifact.to_path_buf(),
        bytes: final_css.len() as u64,
        source_features,
        features,
        warnings,
        visual: None,
    }
}

/// Read the artifact at `path` and validate it against `source_css`.
pub fn validate_artifact(path: &Path, source_css: &str) -> Result<ValidationReport, StageError> {
    let final_css = std::fs::read_to_string(path).map_err(|e| StageError::io(path, e))?;
    Ok(validate_text(path, source_css, &final_css))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_features() {
        let features = FeatureSet::detect(
            ":root{--brand:#0af}@media (max-width:600px){.a{color:red!important}}@keyframes x{to{opacity:0}}",
        );
        assert_eq!(
            features,
            FeatureSet {
                custom_properties: true,
                media_queries: true,
                keyframes: true,
                important: true,
            }
        );
        assert_eq!(FeatureSet::detect(".a{margin:0}"), FeatureSet::default());
    }

    #[test]
    fn test_comment_dashes_are_not_custom_properties() {
        assert!(!FeatureSet::detect("/* -- */ .a{}").custom_properties);
        assert!(FeatureSet::detect(".a{color:var(--x)}").custom_properties);
    }

    #[test]
    fn test_missing_feature_is_warning() {
        let report = validate_text(
            Path::new("dist/style.final.min.css"),
            "@media print{.a{color:red}} .b{color:var(--x)}",
            ".b{color:var(--x)}",
        );
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("media queries"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_clean_and_empty_artifacts() {
        let css = ".a{color:red}";
        assert!(validate_text(Path::new("x.css"), css, css).is_clean());

        let empty = validate_text(Path::new("x.css"), css, "  ");
        assert_eq!(empty.warnings, vec!["final artifact is empty".to_string()]);
    }

    #[test]
    fn test_failed_visual_check_adds_warning() {
        let report = validate_text(Path::new("x.css"), ".a{}", ".a{}").with_visual(VisualCheck {
            command: "npx backstop test".to_string(),
            exit_code: 1,
            passed: false,
        });
        assert_eq!(report.warnings.len(), 1);
        assert!(report.visual.is_some());
    }

    #[test]
    fn test_visual_spawn_failure_is_a_warning() {
        let error = StageError::Spawn {
            command: "backstop test".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let report = validate_text(Path::new("x.css"), ":root{--a:1}", ":root{--a:1}")
            .with_visual_error("backstop test", &error);
        assert!(!report.is_clean());
        assert!(report.warnings[0].contains("could not run"));
        assert!(report.features.custom_properties);
        assert!(report.visual.is_none());
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = validate_artifact(&dir.path().join("none.css"), ".a{}").unwrap_err();
        assert!(matches!(err, StageError::Io { .. }));
    }
}
