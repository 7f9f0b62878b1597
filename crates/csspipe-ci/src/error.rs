//! Stage-level error taxonomy.
//!
//! Whether an error aborts the run is decided by the failing stage's
//! [`FailurePolicy`](crate::stage::FailurePolicy), not by the error kind.

use std::path::PathBuf;

use csspipe_core::{MinifyError, StyleError};

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("`{command}` exited with code {exit_code}")]
    Build {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error(transparent)]
    Minify(#[from] MinifyError),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("required input not available: {0}")]
    Missing(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Captured tool output attached to the error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            StageError::Build { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

impl From<StyleError> for StageError {
    fn from(err: StyleError) -> Self {
        match err {
            StyleError::Parse(msg) => StageError::Parse(msg),
            StyleError::Io { path, source } => StageError::Io { path, source },
            StyleError::Minify(e) => StageError::Minify(e),
            StyleError::Serialization(e) => StageError::Serialization(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_carries_output() {
        let err = StageError::Build {
            command: "npx postcss".to_string(),
            exit_code: 2,
            output: "Unknown word".to_string(),
        };
        assert_eq!(err.to_string(), "`npx postcss` exited with code 2");
        assert_eq!(err.output(), Some("Unknown word"));
        assert!(StageError::Parse("x".to_string()).output().is_none());
    }

    #[test]
    fn test_style_error_conversion_keeps_kind() {
        let err: StageError = StyleError::Parse("bad".to_string()).into();
        assert!(matches!(err, StageError::Parse(_)));

        let err: StageError = StyleError::io(
            "css/style.css",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        )
        .into();
        assert!(matches!(err, StageError::Io { .. }));
    }
}
