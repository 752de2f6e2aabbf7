//! Content matchers.
//!
//! Every matcher scores a (reference, remux) pair through [`Matcher::compare`].
//! Matchers that can reduce one file to a standalone signature also expose
//! a [`Fingerprinter`], which lets the pipeline extract each file once and
//! compare signatures in memory.
//!
//! # Variants
//!
//! - `correlation` - Chunked GCC-PHAT on full-length 48 kHz audio
//! - `chromaprint` - fpcalc sub-fingerprints, bitwise similarity
//! - `mfcc` - Mean MFCC vector, cosine similarity
//! - `peak` / `invariant` - Spectral landmark hashing with offset voting
//! - `panako` - External Panako store/query
//! - `phash` - Perceptual and difference frame hashes with alignment search
//! - `scene` - Scene-length rhythm via DTW or Pearson

mod chromaprint;
mod context;
mod correlation;
mod landmark;
mod mfcc;
mod panako;
mod phash;
mod scene;
mod types;

use std::fmt;
use std::path::Path;

pub use chromaprint::{bit_similarity, parse_raw_fingerprint, ChromaprintMatcher};
pub use context::MatcherContext;
pub use correlation::{chunked_correlation, CorrelationMatcher};
pub use landmark::{compare_landmarks, hash_peaks, LandmarkFingerprint, LandmarkMatcher, LandmarkVariant};
pub use mfcc::MfccMatcher;
pub use panako::PanakoMatcher;
pub use phash::{align_hash_sequences, FrameHashes, PerceptualHashMatcher};
pub use scene::{compare_scene_patterns, durations_from_cuts, SceneDetectionMatcher};
pub use types::{Fingerprint, RunFlag, ScoreResult, FAILED_SCORE};

use crate::error::MatchResult;

/// Scores one (reference, remux) pair.
///
/// Implementations never fail outright: problems collapse into a zero score
/// with the reason in `info`. They poll their run flag and return early
/// once it is cleared.
pub trait Matcher: Send {
    fn kind(&self) -> MatcherKind;

    /// Compare a reference with a remux, using `language` to pick audio.
    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult;

    /// Per-file fingerprinting, for matchers that support it.
    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        None
    }

    /// Flag shared with whoever may stop this matcher.
    fn run_flag(&self) -> &RunFlag;

    /// Request a stop; idempotent.
    fn stop(&self) {
        self.run_flag().stop();
    }

    fn is_running(&self) -> bool {
        self.run_flag().is_running()
    }
}

/// Extracts standalone per-file signatures and compares them.
pub trait Fingerprinter {
    fn fingerprint(&mut self, path: &Path, language: Option<&str>) -> MatchResult<Fingerprint>;

    /// Similarity in [0, 1], or `FAILED_SCORE` for incomparable input.
    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64;
}

/// How the pipeline drives a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Call `compare` on every pair.
    Exhaustive,
    /// Fingerprint every file once, then compare fingerprints.
    FingerprintBatch,
}

/// Available matcher modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Correlation,
    Chromaprint,
    Mfcc,
    Peak,
    Invariant,
    Panako,
    PerceptualHash,
    SceneDetection,
}

impl MatcherKind {
    pub const ALL: [MatcherKind; 8] = [
        MatcherKind::Correlation,
        MatcherKind::Chromaprint,
        MatcherKind::Mfcc,
        MatcherKind::Peak,
        MatcherKind::Invariant,
        MatcherKind::Panako,
        MatcherKind::PerceptualHash,
        MatcherKind::SceneDetection,
    ];

    /// Config identifier.
    pub fn id(&self) -> &'static str {
        match self {
            MatcherKind::Correlation => "correlation",
            MatcherKind::Chromaprint => "chromaprint",
            MatcherKind::Mfcc => "mfcc",
            MatcherKind::Peak => "peak",
            MatcherKind::Invariant => "invariant",
            MatcherKind::Panako => "panako",
            MatcherKind::PerceptualHash => "phash",
            MatcherKind::SceneDetection => "scene",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            MatcherKind::Correlation => "Correlation (Audio)",
            MatcherKind::Chromaprint => "Chromaprint (Audio)",
            MatcherKind::Mfcc => "MFCC (Audio)",
            MatcherKind::Peak => "Peak Landmarks (Audio)",
            MatcherKind::Invariant => "Invariant Landmarks (Audio)",
            MatcherKind::Panako => "Panako (Audio)",
            MatcherKind::PerceptualHash => "Perceptual Hash (Video)",
            MatcherKind::SceneDetection => "Scene Detection (Video)",
        }
    }

    /// Look up a mode by id or display label, ignoring case.
    pub fn from_mode(mode: &str) -> Option<Self> {
        let mode = mode.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(mode) || k.label().eq_ignore_ascii_case(mode))
    }

    pub fn strategy(&self) -> MatchStrategy {
        match self {
            MatcherKind::Chromaprint | MatcherKind::Peak | MatcherKind::Invariant => {
                MatchStrategy::FingerprintBatch
            }
            _ => MatchStrategy::Exhaustive,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MatcherKind::PerceptualHash | MatcherKind::SceneDetection)
    }

    /// Suggested confidence threshold for this mode.
    pub fn default_threshold(&self) -> f64 {
        match self {
            MatcherKind::Panako => 0.80,
            k if k.is_video() => 0.85,
            _ => 0.75,
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Build a matcher of `kind` sharing `flag` with its caller.
pub fn create_matcher(kind: MatcherKind, ctx: MatcherContext, flag: RunFlag) -> Box<dyn Matcher> {
    match kind {
        MatcherKind::Correlation => Box::new(CorrelationMatcher::new(ctx, flag)),
        MatcherKind::Chromaprint => Box::new(ChromaprintMatcher::new(ctx, flag)),
        MatcherKind::Mfcc => Box::new(MfccMatcher::new(ctx, flag)),
        MatcherKind::Peak => Box::new(LandmarkMatcher::new(ctx, flag, LandmarkVariant::Peak)),
        MatcherKind::Invariant => {
            Box::new(LandmarkMatcher::new(ctx, flag, LandmarkVariant::Invariant))
        }
        MatcherKind::Panako => Box::new(PanakoMatcher::new(ctx, flag)),
        MatcherKind::PerceptualHash => Box::new(PerceptualHashMatcher::new(ctx, flag)),
        MatcherKind::SceneDetection => Box::new(SceneDetectionMatcher::new(ctx, flag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_by_id_and_label() {
        assert_eq!(MatcherKind::from_mode("phash"), Some(MatcherKind::PerceptualHash));
        assert_eq!(
            MatcherKind::from_mode("correlation (audio)"),
            Some(MatcherKind::Correlation)
        );
        assert_eq!(MatcherKind::from_mode(" MFCC "), Some(MatcherKind::Mfcc));
        assert_eq!(MatcherKind::from_mode("bogus"), None);
    }

    #[test]
    fn ids_round_trip() {
        for kind in MatcherKind::ALL {
            assert_eq!(MatcherKind::from_mode(kind.id()), Some(kind));
        }
    }

    #[test]
    fn batch_modes() {
        let batch: Vec<MatcherKind> = MatcherKind::ALL
            .into_iter()
            .filter(|k| k.strategy() == MatchStrategy::FingerprintBatch)
            .collect();
        assert_eq!(
            batch,
            vec![MatcherKind::Chromaprint, MatcherKind::Peak, MatcherKind::Invariant]
        );
    }

    #[test]
    fn default_thresholds() {
        assert_eq!(MatcherKind::Panako.default_threshold(), 0.80);
        assert_eq!(MatcherKind::SceneDetection.default_threshold(), 0.85);
        assert_eq!(MatcherKind::Correlation.default_threshold(), 0.75);
    }
}
