//! Media probing and decoding.
//!
//! Everything that touches an external tool (ffprobe, ffmpeg, fpcalc,
//! Java/Panako) goes through the [`MediaBackend`] trait. Matchers only
//! see decoded buffers, frames, and fingerprint strings, which keeps the
//! scoring logic testable without any binaries installed.
//!
//! # Architecture
//!
//! - `types` - Stream descriptors, decode windows, sample buffers
//! - `backend` - The `MediaBackend` trait and its error type
//! - `ffmpeg` - `CommandLineBackend`, the production implementation
//! - `process` - Child process execution with enforced timeouts
//! - `streams` - Audio stream selection by language
//! - `panako` - Panako query output parsing

mod backend;
mod ffmpeg;
mod panako;
mod process;
mod streams;
mod types;

pub use backend::{MediaBackend, MediaError, MediaResult};
pub use ffmpeg::{bytes_to_f32_samples, parse_fpcalc_output, parse_scene_cuts, CommandLineBackend};
pub(crate) use ffmpeg::wav_path;
pub use panako::{parse_panako_output, PanakoMatch};
pub use streams::{audio_streams, select_audio_stream};
pub use types::{AudioSamples, AudioWindow, CodecType, StreamDescriptor};
