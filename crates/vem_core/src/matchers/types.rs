//! Scores, fingerprints, and the cooperative stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::landmark::LandmarkFingerprint;
use super::phash::FrameHashes;
use crate::error::MatchError;

/// Score reported when a comparison could not be made at all.
pub const FAILED_SCORE: f64 = -1.0;

/// Outcome of comparing one reference with one remux.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Similarity in [0, 1], or `FAILED_SCORE`.
    pub confidence: f64,
    /// Human-readable diagnostic.
    pub info: String,
}

impl ScoreResult {
    /// A score, clamped to [0, 1].
    pub fn new(confidence: f64, info: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            confidence,
            info: info.into(),
        }
    }

    /// Zero confidence with a reason.
    pub fn no_evidence(info: impl Into<String>) -> Self {
        Self::new(0.0, info)
    }

    /// Failed comparison that must never be chosen as a best match.
    pub fn failed(info: impl Into<String>) -> Self {
        Self {
            confidence: FAILED_SCORE,
            info: info.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.confidence < 0.0
    }
}

impl From<MatchError> for ScoreResult {
    /// Too little signal is zero evidence; anything that kept the file from
    /// being read at all is a failed comparison.
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::InsufficientSignal(_) => ScoreResult::no_evidence(err.to_string()),
            _ => ScoreResult::failed(err.to_string()),
        }
    }
}

/// Per-file signature produced by a fingerprinting matcher.
///
/// Only fingerprints of the same variant can be compared.
#[derive(Debug, Clone, PartialEq)]
pub enum Fingerprint {
    /// Raw Chromaprint sub-fingerprints.
    Chromaprint(Vec<u32>),
    /// Mean MFCC vector.
    Mfcc(Arc<Vec<f64>>),
    /// Landmark hash to anchor frame.
    Landmark(Arc<LandmarkFingerprint>),
    /// Per-frame perceptual and difference hashes.
    VideoHashes(Arc<Vec<FrameHashes>>),
    /// Scene lengths in seconds.
    SceneDurations(Arc<Vec<f64>>),
}

impl Fingerprint {
    /// Short name of the variant.
    pub fn family(&self) -> &'static str {
        match self {
            Fingerprint::Chromaprint(_) => "chromaprint",
            Fingerprint::Mfcc(_) => "mfcc",
            Fingerprint::Landmark(_) => "landmark",
            Fingerprint::VideoHashes(_) => "video hash",
            Fingerprint::SceneDurations(_) => "scene",
        }
    }
}

/// Score for a fingerprint pair of different variants.
pub(crate) fn mismatched(a: &Fingerprint, b: &Fingerprint) -> f64 {
    let err = MatchError::InvalidFingerprintPair {
        left: a.family(),
        right: b.family(),
    };
    tracing::warn!("{}", err);
    FAILED_SCORE
}

/// Shared "keep running" flag. Cleared once to request a stop; never set
/// back.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A new flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
