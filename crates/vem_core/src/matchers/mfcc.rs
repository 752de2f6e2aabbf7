//! Mean-MFCC timbre signature compared by cosine similarity.

use std::path::Path;
use std::sync::Arc;

use super::types::mismatched;
use super::{Fingerprint, Fingerprinter, Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::dsp::{cosine_similarity, MfccExtractor};
use crate::error::{MatchError, MatchResult};

/// Coefficients kept per frame.
const N_MFCC: usize = 13;

pub struct MfccMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
    extractor: MfccExtractor,
}

impl MfccMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self {
            ctx,
            flag,
            extractor: MfccExtractor::new(N_MFCC),
        }
    }

    fn features(&self, path: &Path, language: Option<&str>) -> MatchResult<Arc<Vec<f64>>> {
        let stream = self.ctx.audio_stream_index(path, language)?;
        if let Some(features) = self.ctx.cache.get_mfcc(path, stream) {
            return Ok(features);
        }

        let rate = self.ctx.settings.spectral.sample_rate;
        let window = self.ctx.analysis_window(path)?;
        let audio = self.ctx.audio(path, stream, rate, window)?;

        let features = self
            .extractor
            .mean(&audio.samples, rate)
            .ok_or_else(|| MatchError::insufficient("audio too short for MFCC"))?;

        Ok(self.ctx.cache.set_mfcc(path, stream, features))
    }
}

impl Matcher for MfccMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Mfcc
    }

    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult {
        let (Ok(a), Ok(b)) = (
            self.features(reference, language),
            self.features(remux, language),
        ) else {
            return ScoreResult::failed("Failed to extract MFCC features");
        };

        ScoreResult::new(mfcc_similarity(&a, &b), "MFCC similarity")
    }

    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        Some(self)
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

impl Fingerprinter for MfccMatcher {
    fn fingerprint(&mut self, path: &Path, language: Option<&str>) -> MatchResult<Fingerprint> {
        self.features(path, language).map(Fingerprint::Mfcc)
    }

    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        match (a, b) {
            (Fingerprint::Mfcc(a), Fingerprint::Mfcc(b)) => mfcc_similarity(a, b),
            _ => mismatched(a, b),
        }
    }
}

/// Cosine similarity floored at zero.
fn mfcc_similarity(a: &[f64], b: &[f64]) -> f64 {
    cosine_similarity(a, b).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_vectors_floor_at_zero() {
        assert_eq!(mfcc_similarity(&[1.0, 2.0], &[-1.0, -2.0]), 0.0);
        assert!((mfcc_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-12);
        assert_eq!(mfcc_similarity(&[0.0; 13], &[1.0; 13]), 0.0);
    }
}
