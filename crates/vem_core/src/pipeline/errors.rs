//! Error types for the matching pipeline.

use thiserror::Error;

/// Errors that abort a run before any comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The configured mode names no matcher.
    #[error("Invalid matching mode '{0}'")]
    InvalidMode(String),
}

impl PipelineError {
    /// Create an invalid mode error.
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode(mode.into())
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
