//! Perceptual video hashing.
//!
//! Frames are sampled evenly across the middle of each file and reduced to
//! a DCT perceptual hash plus a gradient difference hash. Sequences are
//! compared under small frame offsets to absorb trimmed intros.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use image_hasher::{HashAlg, Hasher, HasherConfig};

use super::types::mismatched;
use super::{Fingerprint, Fingerprinter, Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::dsp::linspace;
use crate::error::{MatchError, MatchResult};

/// Cache key for this hashing scheme.
const CACHE_METHOD: &str = "phash";

/// Shortest overlap considered by the alignment search.
const MIN_OVERLAP: usize = 10;

/// Perceptual and difference hash of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHashes {
    pub perceptual: Vec<u8>,
    pub difference: Vec<u8>,
}

impl FrameHashes {
    pub fn new(perceptual: Vec<u8>, difference: Vec<u8>) -> Self {
        Self {
            perceptual,
            difference,
        }
    }

    /// Mean of the two normalized Hamming similarities.
    pub fn similarity(&self, other: &FrameHashes) -> f64 {
        (hamming_similarity(&self.perceptual, &other.perceptual)
            + hamming_similarity(&self.difference, &other.difference))
            / 2.0
    }
}

fn hamming_similarity(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let differing: u32 = a[..len]
        .iter()
        .zip(&b[..len])
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    1.0 - differing as f64 / (len * 8) as f64
}

/// Builds the two hashers for one hash size.
struct FrameHashers {
    perceptual: Hasher,
    difference: Hasher,
}

impl FrameHashers {
    fn new(hash_size: u32) -> Self {
        Self {
            perceptual: HasherConfig::new()
                .hash_alg(HashAlg::Mean)
                .preproc_dct()
                .hash_size(hash_size, hash_size)
                .to_hasher(),
            difference: HasherConfig::new()
                .hash_alg(HashAlg::Gradient)
                .hash_size(hash_size, hash_size)
                .to_hasher(),
        }
    }

    fn hash(&self, frame: RgbImage) -> FrameHashes {
        let image = DynamicImage::ImageRgb8(frame);
        FrameHashes::new(
            self.perceptual.hash_image(&image).as_bytes().to_vec(),
            self.difference.hash_image(&image).as_bytes().to_vec(),
        )
    }
}

/// Best mean similarity over frame offsets in `-max_offset..=max_offset`.
///
/// Offsets leaving fewer than ten overlapping frames are skipped. Returns
/// `(similarity, offset)`, `(0.0, 0)` when no offset qualifies; ties keep
/// the most negative offset.
pub fn align_hash_sequences(a: &[FrameHashes], b: &[FrameHashes], max_offset: usize) -> (f64, i64) {
    let max_offset = max_offset as i64;
    let mut best = (0.0, 0);

    for offset in -max_offset..=max_offset {
        let shift = offset.unsigned_abs() as usize;
        let (s1, s2) = if offset >= 0 {
            (a.get(shift..).unwrap_or(&[]), b)
        } else {
            (a, b.get(shift..).unwrap_or(&[]))
        };

        let overlap = s1.len().min(s2.len());
        if overlap < MIN_OVERLAP {
            continue;
        }

        let total: f64 = s1[..overlap]
            .iter()
            .zip(&s2[..overlap])
            .map(|(x, y)| x.similarity(y))
            .sum();
        let similarity = total / overlap as f64;

        if similarity > best.0 {
            best = (similarity, offset);
        }
    }

    best
}

pub struct PerceptualHashMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
}

impl PerceptualHashMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self { ctx, flag }
    }

    /// Sample timestamps between the trimmed edges.
    fn timestamps(&self, duration: f64) -> Vec<f64> {
        let edge = self.ctx.settings.video_edge_fraction();
        let (mut start, mut end) = (duration * edge, duration * (1.0 - edge));
        if start >= end {
            start = 0.0;
            end = duration;
        }
        linspace(start, end, self.ctx.settings.video.frame_count)
    }

    fn video_hashes(&self, path: &Path) -> MatchResult<Arc<Vec<FrameHashes>>> {
        let video = &self.ctx.settings.video;

        let hashes = match self.ctx.cache.get_video_hashes(path, CACHE_METHOD) {
            Some(hashes) => hashes,
            None => {
                let duration = self.ctx.duration(path)?;
                let hashers = FrameHashers::new(video.hash_size);
                let mut hashes = Vec::with_capacity(video.frame_count);

                for timestamp in self.timestamps(duration) {
                    if !self.flag.is_running() {
                        return Err(MatchError::insufficient("stopped"));
                    }
                    let frames = self.ctx.backend.decode_frames(path, &[timestamp])?;
                    hashes.extend(frames.into_iter().map(|frame| hashers.hash(frame)));
                }

                if hashes.is_empty() {
                    return Err(MatchError::decode("no frames decoded"));
                }
                self.ctx.cache.set_video_hashes(path, CACHE_METHOD, hashes)
            }
        };

        if hashes.len() < video.min_valid_frames {
            return Err(MatchError::insufficient(format!(
                "only {} frames hashed",
                hashes.len()
            )));
        }
        Ok(hashes)
    }
}

impl Matcher for PerceptualHashMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::PerceptualHash
    }

    fn compare(&mut self, reference: &Path, remux: &Path, _language: Option<&str>) -> ScoreResult {
        let (Ok(a), Ok(b)) = (self.video_hashes(reference), self.video_hashes(remux)) else {
            return ScoreResult::failed("Failed to extract video frames");
        };

        let (similarity, offset) =
            align_hash_sequences(&a, &b, self.ctx.settings.video.max_offset);
        ScoreResult::new(similarity, format!("Video pHash, offset={offset}"))
    }

    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        Some(self)
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

impl Fingerprinter for PerceptualHashMatcher {
    fn fingerprint(&mut self, path: &Path, _language: Option<&str>) -> MatchResult<Fingerprint> {
        self.video_hashes(path).map(Fingerprint::VideoHashes)
    }

    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        match (a, b) {
            (Fingerprint::VideoHashes(a), Fingerprint::VideoHashes(b)) => {
                align_hash_sequences(a, b, self.ctx.settings.video.max_offset).0
            }
            _ => mismatched(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distinct per-index hashes (32 bytes each).
    fn frame(i: usize) -> FrameHashes {
        let bytes: Vec<u8> = (0..32).map(|j| ((i * 31 + j * 7) % 251) as u8 ^ (i as u8).rotate_left(3)).collect();
        FrameHashes::new(bytes.clone(), bytes.iter().map(|b| !b).collect())
    }

    fn sequence(range: std::ops::Range<usize>) -> Vec<FrameHashes> {
        range.map(frame).collect()
    }

    #[test]
    fn identical_sequences_align_at_zero() {
        let seq = sequence(0..25);
        let (similarity, offset) = align_hash_sequences(&seq, &seq, 5);
        assert_eq!(similarity, 1.0);
        assert_eq!(offset, 0);
    }

    #[test]
    fn finds_positive_offset() {
        // b starts three frames later in the same content
        let a = sequence(0..25);
        let b = sequence(3..28);
        let (similarity, offset) = align_hash_sequences(&a, &b, 5);
        assert_eq!(offset, 3);
        assert_eq!(similarity, 1.0);
    }

    #[test]
    fn short_sequences_have_no_valid_offset() {
        let seq = sequence(0..9);
        assert_eq!(align_hash_sequences(&seq, &seq, 5), (0.0, 0));
    }

    #[test]
    fn hamming_similarity_counts_bits() {
        assert_eq!(hamming_similarity(&[0xFF], &[0x00]), 0.0);
        assert_eq!(hamming_similarity(&[0xF0], &[0x00]), 0.5);
        assert_eq!(hamming_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn hashers_distinguish_images() {
        let hashers = FrameHashers::new(16);
        let gradient = RgbImage::from_fn(64, 64, |x, _| image::Rgb([(x * 4) as u8, 0, 0]));
        let stripes = RgbImage::from_fn(64, 64, |_, y| {
            if (y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });

        let a = hashers.hash(gradient.clone());
        let b = hashers.hash(gradient);
        let c = hashers.hash(stripes);

        assert!(!a.perceptual.is_empty());
        assert_eq!(a.similarity(&b), 1.0);
        assert!(a.similarity(&c) < 1.0);
    }
}
