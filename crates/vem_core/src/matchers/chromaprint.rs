//! Chromaprint fingerprints compared bit by bit.

use std::path::Path;

use super::types::mismatched;
use super::{Fingerprint, Fingerprinter, Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult, FAILED_SCORE};
use crate::error::{MatchError, MatchResult};

pub struct ChromaprintMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
}

impl ChromaprintMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self { ctx, flag }
    }

    fn raw_fingerprint(&self, path: &Path, language: Option<&str>) -> MatchResult<Vec<u32>> {
        let stream = self.ctx.audio_stream_index(path, language)?;

        let raw = match self.ctx.cache.get_chromaprint(path, stream) {
            Some(raw) => raw,
            None => {
                let window = self.ctx.analysis_window(path)?;
                let raw = self.ctx.backend.extract_chromaprint(path, stream, window)?;
                self.ctx.cache.set_chromaprint(path, stream, &raw)
            }
        };

        let values = parse_raw_fingerprint(&raw);
        if values.is_empty() {
            return Err(MatchError::NoFingerprint);
        }
        Ok(values)
    }
}

impl Matcher for ChromaprintMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Chromaprint
    }

    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult {
        let (Ok(a), Ok(b)) = (
            self.raw_fingerprint(reference, language),
            self.raw_fingerprint(remux, language),
        ) else {
            return ScoreResult::failed("Failed to generate fingerprints");
        };

        ScoreResult::new(bit_similarity(&a, &b), "Chromaprint similarity")
    }

    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        Some(self)
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

impl Fingerprinter for ChromaprintMatcher {
    fn fingerprint(&mut self, path: &Path, language: Option<&str>) -> MatchResult<Fingerprint> {
        self.raw_fingerprint(path, language)
            .map(Fingerprint::Chromaprint)
    }

    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        match (a, b) {
            (Fingerprint::Chromaprint(a), Fingerprint::Chromaprint(b)) => bit_similarity(a, b),
            _ => mismatched(a, b),
        }
    }
}

/// Parse fpcalc's comma separated integers. Signed values are
/// reinterpreted as 32-bit words; unparseable entries are dropped.
pub fn parse_raw_fingerprint(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|v| v.trim().parse::<i64>().ok())
        .map(|v| v as u32)
        .collect()
}

/// Fraction of equal bits over the common prefix.
///
/// `FAILED_SCORE` when either side is empty.
pub fn bit_similarity(a: &[u32], b: &[u32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return FAILED_SCORE;
    }

    let differing: u64 = a[..len]
        .iter()
        .zip(&b[..len])
        .map(|(x, y)| (x ^ y).count_ones() as u64)
        .sum();

    1.0 - differing as f64 / (32 * len) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_fingerprints_score_one() {
        let fp = vec![0xDEAD_BEEF, 0x1234_5678, 42];
        assert_eq!(bit_similarity(&fp, &fp), 1.0);
    }

    #[test]
    fn complementary_fingerprints_score_zero() {
        let a = vec![0u32; 4];
        let b = vec![u32::MAX; 4];
        assert_eq!(bit_similarity(&a, &b), 0.0);
    }

    #[test]
    fn compares_common_prefix_only() {
        let a = vec![0u32, 0];
        let b = vec![0u32, 0, u32::MAX, u32::MAX];
        assert_eq!(bit_similarity(&a, &b), 1.0);
    }

    #[test]
    fn empty_side_fails() {
        assert_eq!(bit_similarity(&[], &[1]), FAILED_SCORE);
    }

    #[test]
    fn parses_signed_values() {
        assert_eq!(parse_raw_fingerprint("1, -1,abc,3"), vec![1, u32::MAX, 3]);
        assert!(parse_raw_fingerprint("").is_empty());
    }
}
