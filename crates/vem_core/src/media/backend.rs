//! Backend abstraction over the external media tools.

use std::io;
use std::path::Path;

use image::RgbImage;
use thiserror::Error;

use super::panako::PanakoMatch;
use super::types::{AudioSamples, AudioWindow, StreamDescriptor};

/// Errors raised by a media backend.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{tool} not available")]
    ToolUnavailable { tool: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} failed (exit code {code:?}): {message}")]
    CommandFailed {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("Decode failed: {0}")]
    DecodeFailure(String),

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MediaError {
    pub fn unavailable(tool: impl Into<String>) -> Self {
        MediaError::ToolUnavailable { tool: tool.into() }
    }

    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        MediaError::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Source of stream metadata, decoded audio, video frames, and tool
/// fingerprints.
///
/// Implementations must be shareable across the pipeline worker thread.
pub trait MediaBackend: Send + Sync {
    /// List every stream in the container.
    fn probe_streams(&self, path: &Path) -> MediaResult<Vec<StreamDescriptor>>;

    /// Container duration in seconds.
    fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Decode one audio stream to mono samples at `sample_rate`.
    fn decode_audio(
        &self,
        path: &Path,
        stream_index: usize,
        sample_rate: u32,
        window: AudioWindow,
    ) -> MediaResult<AudioSamples>;

    /// Decode one audio stream to a mono WAV file.
    fn decode_audio_to_file(
        &self,
        path: &Path,
        stream_index: usize,
        sample_rate: u32,
        output: &Path,
    ) -> MediaResult<()>;

    /// Grab one RGB frame per timestamp. Best effort: frames that fail to
    /// decode are left out of the result.
    fn decode_frames(&self, path: &Path, timestamps: &[f64]) -> MediaResult<Vec<RgbImage>>;

    /// Raw Chromaprint fingerprint (comma separated integers) of one
    /// audio stream within `window`.
    fn extract_chromaprint(
        &self,
        path: &Path,
        stream_index: usize,
        window: AudioWindow,
    ) -> MediaResult<String>;

    /// Timestamps (seconds) of content cuts. `threshold` uses the 0-100
    /// content-change scale.
    fn detect_scene_cuts(&self, path: &Path, threshold: f64) -> MediaResult<Vec<f64>>;

    /// Add a WAV file to the Panako database rooted at `workspace`.
    fn panako_store(&self, _workspace: &Path, _wav: &Path) -> MediaResult<()> {
        Err(MediaError::unavailable("Panako"))
    }

    /// Query the Panako database rooted at `workspace` with a WAV file.
    fn panako_query(&self, _workspace: &Path, _wav: &Path) -> MediaResult<Option<PanakoMatch>> {
        Err(MediaError::unavailable("Panako"))
    }
}
