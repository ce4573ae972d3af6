//! Error types shared across Clipforge crates.

use std::path::PathBuf;

/// Top-level error type for Clipforge operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipforgeError {
    #[error("Engine not found: {message}")]
    EngineMissing { message: String },

    #[error("Engine process error: {message}")]
    Engine { message: String },

    #[error("Normalization error: {message}")]
    Normalize { message: String },

    #[error("Concatenation error: {message}")]
    Concat { message: String },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipforgeError.
pub type ClipforgeResult<T> = Result<T, ClipforgeError>;

impl ClipforgeError {
    pub fn engine_missing(msg: impl Into<String>) -> Self {
        Self::EngineMissing {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn normalize(msg: impl Into<String>) -> Self {
        Self::Normalize {
            message: msg.into(),
        }
    }

    pub fn concat(msg: impl Into<String>) -> Self {
        Self::Concat {
            message: msg.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ClipforgeError::concat("no segments").to_string(),
            "Concatenation error: no segments"
        );
        assert!(ClipforgeError::Cancelled.is_cancelled());
        assert!(!ClipforgeError::engine("exit 1").is_cancelled());
    }
}
