//! Spectral landmark hashing.
//!
//! Peaks are picked from a magnitude spectrogram; every peak acts as an
//! anchor paired with the peaks in a target zone ahead of it. Each pair is
//! hashed together with its time gap and mapped to the anchor frame.
//! Two fingerprints are compared by voting on the time offset of their
//! shared hashes.
//!
//! Two variants differ in zone shape and hash input:
//! - `Peak` hashes (anchor freq, target freq, dt)
//! - `Invariant` hashes (anchor freq, freq delta, dt) over a narrower,
//!   longer zone

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::types::mismatched;
use super::{Fingerprint, Fingerprinter, Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::dsp::{find_peaks, SpectralPeak, Stft};
use crate::error::{MatchError, MatchResult};

const FFT_SIZE: usize = 4096;
const HOP_LENGTH: usize = 2048;
const PEAK_NEIGHBORHOOD: usize = 20;
const PEAK_MEDIAN_FACTOR: f64 = 1.5;
/// Frames between an anchor and the start of its target zone.
const ANCHOR_DISTANCE: usize = 10;

/// Landmark scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkVariant {
    Peak,
    Invariant,
}

impl LandmarkVariant {
    /// Target zone width in frames.
    fn zone_width(&self) -> usize {
        match self {
            LandmarkVariant::Peak => 60,
            LandmarkVariant::Invariant => 90,
        }
    }

    /// Target zone half-height in bins (exclusive).
    fn zone_height(&self) -> usize {
        match self {
            LandmarkVariant::Peak => 200,
            LandmarkVariant::Invariant => 100,
        }
    }

    fn min_peaks(&self) -> usize {
        match self {
            LandmarkVariant::Peak => 10,
            LandmarkVariant::Invariant => 20,
        }
    }

    fn hash_input(&self, anchor: SpectralPeak, target: SpectralPeak) -> String {
        let dt = target.time - anchor.time;
        match self {
            LandmarkVariant::Peak => format!("{}|{}|{}", anchor.freq, target.freq, dt),
            LandmarkVariant::Invariant => {
                let df = target.freq as i64 - anchor.freq as i64;
                format!("{}|{}|{}", anchor.freq, df, dt)
            }
        }
    }

    fn kind(&self) -> MatcherKind {
        match self {
            LandmarkVariant::Peak => MatcherKind::Peak,
            LandmarkVariant::Invariant => MatcherKind::Invariant,
        }
    }
}

impl fmt::Display for LandmarkVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandmarkVariant::Peak => write!(f, "peak"),
            LandmarkVariant::Invariant => write!(f, "invariant"),
        }
    }
}

/// Landmark hash to anchor frame. A hash seen at several anchors keeps
/// the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandmarkFingerprint {
    hashes: HashMap<u64, u32>,
}

impl LandmarkFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: u64, anchor_time: u32) {
        self.hashes.insert(hash, anchor_time);
    }

    pub fn get(&self, hash: u64) -> Option<u32> {
        self.hashes.get(&hash).copied()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.hashes.iter().map(|(&h, &t)| (h, t))
    }
}

impl FromIterator<(u64, u32)> for LandmarkFingerprint {
    fn from_iter<I: IntoIterator<Item = (u64, u32)>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

/// 64-bit digest of a landmark triple.
fn landmark_hash(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Pair every anchor with the peaks in its target zone and hash the pairs.
///
/// Anchors are visited in the order given, so later anchors win on
/// repeated hashes.
pub fn hash_peaks(peaks: &[SpectralPeak], variant: LandmarkVariant) -> LandmarkFingerprint {
    let mut fingerprint = LandmarkFingerprint::new();

    for &anchor in peaks {
        let zone_start = anchor.time + ANCHOR_DISTANCE;
        let zone_end = zone_start + variant.zone_width();

        for &target in peaks {
            if target.time < zone_start || target.time >= zone_end {
                continue;
            }
            if anchor.freq.abs_diff(target.freq) >= variant.zone_height() {
                continue;
            }
            let hash = landmark_hash(&variant.hash_input(anchor, target));
            fingerprint.insert(hash, anchor.time as u32);
        }
    }

    fingerprint
}

/// Largest group of shared hashes agreeing on one time offset, divided by
/// the size of the smaller fingerprint.
pub fn compare_landmarks(a: &LandmarkFingerprint, b: &LandmarkFingerprint) -> f64 {
    let total = a.len().min(b.len());
    if total == 0 {
        return 0.0;
    }

    let mut offsets: HashMap<i64, usize> = HashMap::new();
    for (hash, time_a) in a.iter() {
        if let Some(time_b) = b.get(hash) {
            *offsets.entry(time_b as i64 - time_a as i64).or_default() += 1;
        }
    }

    let best_chain = offsets.values().copied().max().unwrap_or(0);
    best_chain as f64 / total as f64
}

pub struct LandmarkMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
    variant: LandmarkVariant,
    stft: Stft,
    /// Fingerprints computed by this matcher, keyed by (path, language).
    fingerprints: HashMap<(PathBuf, Option<String>), Arc<LandmarkFingerprint>>,
}

impl LandmarkMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag, variant: LandmarkVariant) -> Self {
        Self {
            ctx,
            flag,
            variant,
            stft: Stft::new(FFT_SIZE, HOP_LENGTH),
            fingerprints: HashMap::new(),
        }
    }

    pub fn variant(&self) -> LandmarkVariant {
        self.variant
    }

    fn landmarks(&mut self, path: &Path, language: Option<&str>) -> MatchResult<Arc<LandmarkFingerprint>> {
        let key = (path.to_path_buf(), language.map(str::to_string));
        if let Some(fingerprint) = self.fingerprints.get(&key) {
            return Ok(Arc::clone(fingerprint));
        }

        let fingerprint = Arc::new(self.build(path, language)?);
        tracing::debug!(
            "{} landmarks for {}: {} hashes",
            self.variant,
            path.display(),
            fingerprint.len()
        );
        self.fingerprints.insert(key, Arc::clone(&fingerprint));
        Ok(fingerprint)
    }

    fn build(&self, path: &Path, language: Option<&str>) -> MatchResult<LandmarkFingerprint> {
        let stream = self.ctx.audio_stream_index(path, language)?;
        let window = self.ctx.analysis_window(path)?;
        let rate = self.ctx.settings.spectral.sample_rate;
        let audio = self.ctx.audio(path, stream, rate, window)?;

        let spectrogram = self.stft.magnitude(&audio.samples);
        if spectrogram.is_empty() {
            return Err(MatchError::insufficient("audio shorter than one analysis frame"));
        }

        let peaks = find_peaks(&spectrogram, PEAK_NEIGHBORHOOD, PEAK_MEDIAN_FACTOR);
        if peaks.len() < self.variant.min_peaks() {
            return Err(MatchError::insufficient(format!(
                "only {} spectral peaks",
                peaks.len()
            )));
        }

        let fingerprint = hash_peaks(&peaks, self.variant);
        if fingerprint.is_empty() {
            return Err(MatchError::NoFingerprint);
        }
        Ok(fingerprint)
    }
}

impl Matcher for LandmarkMatcher {
    fn kind(&self) -> MatcherKind {
        self.variant.kind()
    }

    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult {
        let a = match self.landmarks(reference, language) {
            Ok(fp) => fp,
            Err(err) => return ScoreResult::from(err),
        };
        let b = match self.landmarks(remux, language) {
            Ok(fp) => fp,
            Err(err) => return ScoreResult::from(err),
        };

        ScoreResult::new(
            compare_landmarks(&a, &b),
            format!("{} landmark chain", self.variant),
        )
    }

    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        Some(self)
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

impl Fingerprinter for LandmarkMatcher {
    fn fingerprint(&mut self, path: &Path, language: Option<&str>) -> MatchResult<Fingerprint> {
        self.landmarks(path, language).map(Fingerprint::Landmark)
    }

    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        match (a, b) {
            (Fingerprint::Landmark(a), Fingerprint::Landmark(b)) => compare_landmarks(a, b),
            _ => mismatched(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_vote_counts_largest_chain() {
        // 40 shared hashes at offset +3, 10 at offset +7
        let a: LandmarkFingerprint = (0..100u64).map(|h| (h, h as u32)).collect();
        let b: LandmarkFingerprint = (0..100u64)
            .map(|h| {
                let t = match h {
                    0..=39 => h as u32 + 3,
                    40..=49 => h as u32 + 7,
                    _ => 0,
                };
                // Hashes 50+ are unshared
                let key = if h < 50 { h } else { h + 1000 };
                (key, t)
            })
            .collect();

        assert!((compare_landmarks(&a, &b) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_fingerprint_scores_zero() {
        let a = LandmarkFingerprint::new();
        let b: LandmarkFingerprint = [(1, 1)].into_iter().collect();
        assert_eq!(compare_landmarks(&a, &b), 0.0);
    }

    #[test]
    fn target_zone_bounds() {
        let peaks = vec![
            SpectralPeak::new(0, 100),
            SpectralPeak::new(9, 100),   // before zone
            SpectralPeak::new(10, 150),  // first frame of zone
            SpectralPeak::new(69, 299),  // last frame of zone, freq just inside
            SpectralPeak::new(70, 100),  // past the end
            SpectralPeak::new(40, 300),  // freq delta 200, outside
        ];
        let fp = hash_peaks(&peaks[..], LandmarkVariant::Peak);

        assert!(fp.get(landmark_hash("100|150|10")).is_some());
        assert!(fp.get(landmark_hash("100|299|69")).is_some());
        assert!(fp.get(landmark_hash("100|100|9")).is_none());
        assert!(fp.get(landmark_hash("100|100|70")).is_none());
        assert!(fp.get(landmark_hash("100|300|40")).is_none());
    }

    #[test]
    fn invariant_hash_uses_frequency_delta() {
        let peaks = vec![SpectralPeak::new(0, 100), SpectralPeak::new(20, 80)];
        let fp = hash_peaks(&peaks, LandmarkVariant::Invariant);
        assert_eq!(fp.get(landmark_hash("100|-20|20")), Some(0));
        assert_eq!(fp.len(), 1);
    }

    #[test]
    fn time_shifted_peaks_match_fully() {
        let base: Vec<SpectralPeak> = (0..30)
            .map(|i| SpectralPeak::new(i * 7, 50 + (i * 37) % 150))
            .collect();
        let shifted: Vec<SpectralPeak> = base
            .iter()
            .map(|p| SpectralPeak::new(p.time + 5, p.freq))
            .collect();

        let a = hash_peaks(&base, LandmarkVariant::Peak);
        let b = hash_peaks(&shifted, LandmarkVariant::Peak);
        assert!(!a.is_empty());
        assert!((compare_landmarks(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn last_anchor_wins_on_repeated_hash() {
        let mut fp = LandmarkFingerprint::new();
        fp.insert(7, 1);
        fp.insert(7, 9);
        assert_eq!(fp.get(7), Some(9));
    }
}
