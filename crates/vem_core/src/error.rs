//! Errors raised while scoring a pair of media files.
//!
//! Matchers never surface these to the pipeline directly: a failed
//! comparison collapses into a failed score (or a zero score, for weak
//! signal) with the error's message as the diagnostic text.

use thiserror::Error;

use crate::media::MediaError;

/// Errors that can occur inside a matcher.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No audio stream found")]
    NoAudioStream,

    #[error("Failed to decode media: {0}")]
    DecodeFailure(String),

    #[error("{0} not available")]
    ToolUnavailable(String),

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Insufficient signal: {0}")]
    InsufficientSignal(String),

    #[error("Failed to generate fingerprint")]
    NoFingerprint,

    #[error("Cannot compare {left} fingerprint with {right} fingerprint")]
    InvalidFingerprintPair {
        left: &'static str,
        right: &'static str,
    },
}

impl MatchError {
    /// Create an insufficient-signal error.
    pub fn insufficient(message: impl Into<String>) -> Self {
        MatchError::InsufficientSignal(message.into())
    }

    /// Create a decode failure.
    pub fn decode(message: impl Into<String>) -> Self {
        MatchError::DecodeFailure(message.into())
    }
}

impl From<MediaError> for MatchError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::ToolUnavailable { tool } => MatchError::ToolUnavailable(tool),
            MediaError::Timeout { tool, secs } => MatchError::Timeout { tool, secs },
            MediaError::DecodeFailure(message) => MatchError::DecodeFailure(message),
            other => MatchError::DecodeFailure(other.to_string()),
        }
    }
}

/// Result type for matcher internals.
pub type MatchResult<T> = Result<T, MatchError>;
