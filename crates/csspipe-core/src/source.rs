//! Immutable source stylesheet as read from disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StyleError};

/// Source text of one stylesheet, read once per pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStylesheet {
    path: Option<PathBuf>,
    text: String,
}

impl RawStylesheet {
    /// Wrap in-memory text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            path: None,
            text: text.into(),
        }
    }

    /// Read a stylesheet from disk as UTF-8.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| StyleError::io(path, e))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            text,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in bytes.
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn line_count(&self) -> usize {
        count_lines(&self.text)
    }

    /// SHA-256 hex digest of the source text.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }

    pub fn stats(&self) -> TextStats {
        TextStats {
            bytes: self.byte_len() as u64,
            lines: self.line_count() as u64,
        }
    }
}

/// Byte and line counts of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextStats {
    pub bytes: u64,
    pub lines: u64,
}

/// Count lines the way an editor does: a trailing newline does not open a new line.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let newlines = text.matches('\n').count();
    if text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}
