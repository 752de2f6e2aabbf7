//! VEM Core - content-based matching engine for Video Episode Renamer.
//!
//! This crate pairs "remux" files (re-encoded or re-packaged episodes with
//! unreliable names) with trusted "reference" files by comparing decoded
//! audio or video content. It provides:
//!
//! - A shared, memory-bounded media cache (`cache`)
//! - An external-tool media layer behind a backend trait (`media`)
//! - Signal processing primitives (`dsp`)
//! - Pluggable content matchers (`matchers`)
//! - A cancellable matching pipeline emitting progress and match events (`pipeline`)
//! - TOML configuration and tracing setup (`config`, `logging`)

pub mod cache;
pub mod config;
pub mod dsp;
pub mod error;
pub mod logging;
pub mod matchers;
pub mod media;
pub mod pipeline;

pub use cache::MediaCache;
pub use error::{MatchError, MatchResult};
pub use matchers::{MatcherKind, ScoreResult};
pub use pipeline::{MatchEvent, MatchStatus, MatchingPipeline, PipelineEvent};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
