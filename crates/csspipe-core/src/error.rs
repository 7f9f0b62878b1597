//! Domain-level error taxonomy for csspipe.

use std::path::PathBuf;

/// csspipe domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("minify error: {0}")]
    Minify(#[from] crate::minify::MinifyError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StyleError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for csspipe domain operations.
pub type Result<T> = std::result::Result<T, StyleError>;
