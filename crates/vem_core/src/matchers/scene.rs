//! Scene-cut rhythm matching.
//!
//! Each file is reduced to the sequence of its scene lengths. Two cuts of
//! the same episode share that rhythm even when encodes differ.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::types::mismatched;
use super::{Fingerprint, Fingerprinter, Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::config::SceneComparison;
use crate::dsp::{dtw_distance, pearson};
use crate::error::{MatchError, MatchResult};

/// Fewest common points the Pearson comparison accepts.
const MIN_PEARSON_POINTS: usize = 3;

/// Turn cut timestamps into scene durations.
///
/// The first scene starts at zero. With a known total runtime the tail
/// after the last cut is a scene too. No cuts means no scenes.
pub fn durations_from_cuts(cuts: &[f64], total: Option<f64>) -> Vec<f64> {
    if cuts.is_empty() {
        return Vec::new();
    }

    let mut durations = Vec::with_capacity(cuts.len() + 1);
    let mut previous = 0.0;
    for &cut in cuts {
        durations.push(cut - previous);
        previous = cut;
    }
    if let Some(total) = total.filter(|&t| t > previous) {
        durations.push(total - previous);
    }
    durations
}

fn normalized(durations: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = durations.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(durations.iter().map(|d| d / total).collect())
}

/// Similarity of two scene-duration sequences after scaling each to
/// fractions of its runtime.
pub fn compare_scene_patterns(a: &[f64], b: &[f64], comparison: SceneComparison) -> f64 {
    let (Some(a), Some(b)) = (normalized(a), normalized(b)) else {
        return 0.0;
    };

    match comparison {
        SceneComparison::Dtw => {
            let distance = dtw_distance(&a, &b);
            if distance.is_finite() {
                1.0 / (1.0 + distance)
            } else {
                0.0
            }
        }
        SceneComparison::Pearson => {
            let len = a.len().min(b.len());
            if len < MIN_PEARSON_POINTS {
                return 0.0;
            }
            pearson(&a[..len], &b[..len]).unwrap_or(0.0).max(0.0)
        }
    }
}

pub struct SceneDetectionMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
}

impl SceneDetectionMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self { ctx, flag }
    }

    fn scene_durations(&self, path: &Path) -> MatchResult<Arc<Vec<f64>>> {
        if let Some(durations) = self.ctx.cache.get_scenes(path) {
            return Ok(durations);
        }

        let cuts = self
            .ctx
            .backend
            .detect_scene_cuts(path, self.ctx.settings.scene.threshold)?;
        let total = self.ctx.duration(path).ok();
        let durations = durations_from_cuts(&cuts, total);

        debug!(
            "{} scenes detected in {}",
            durations.len(),
            path.display()
        );

        if durations.is_empty() {
            return Err(MatchError::insufficient("no scene cuts detected"));
        }
        Ok(self.ctx.cache.set_scenes(path, durations))
    }
}

impl Matcher for SceneDetectionMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::SceneDetection
    }

    fn compare(&mut self, reference: &Path, remux: &Path, _language: Option<&str>) -> ScoreResult {
        let (Ok(a), Ok(b)) = (self.scene_durations(reference), self.scene_durations(remux)) else {
            return ScoreResult::failed("Failed to detect scenes");
        };

        ScoreResult::new(
            compare_scene_patterns(&a, &b, self.ctx.settings.scene.comparison),
            "Scene pattern matching",
        )
    }

    fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
        Some(self)
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

impl Fingerprinter for SceneDetectionMatcher {
    fn fingerprint(&mut self, path: &Path, _language: Option<&str>) -> MatchResult<Fingerprint> {
        self.scene_durations(path).map(Fingerprint::SceneDurations)
    }

    fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        match (a, b) {
            (Fingerprint::SceneDurations(a), Fingerprint::SceneDurations(b)) => {
                compare_scene_patterns(a, b, self.ctx.settings.scene.comparison)
            }
            _ => mismatched(a, b),
        }
    }
}
