//! Events emitted by a matching run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::matchers::ScoreResult;

/// Outcome attached to a match event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Best reference at or above the confidence threshold.
    Matched,
    /// Best reference below the threshold.
    LowConfidence,
    /// No reference produced a usable score.
    Unmatched,
    /// Reference never chosen by any remux.
    ReferenceUnused,
}

/// Result for one remux, or one unused reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEvent {
    /// Absent on `ReferenceUnused` events.
    pub remux_path: Option<PathBuf>,
    pub reference_path: Option<PathBuf>,
    pub confidence: f64,
    pub info: String,
    pub status: MatchStatus,
}

impl MatchEvent {
    /// Best reference found for a remux.
    pub fn best(remux: &Path, reference: &Path, score: ScoreResult, threshold: f64) -> Self {
        let status = if score.confidence >= threshold {
            MatchStatus::Matched
        } else {
            MatchStatus::LowConfidence
        };
        Self {
            remux_path: Some(remux.to_path_buf()),
            reference_path: Some(reference.to_path_buf()),
            confidence: score.confidence,
            info: score.info,
            status,
        }
    }

    /// No reference scored for this remux.
    pub fn unmatched(remux: &Path) -> Self {
        Self {
            remux_path: Some(remux.to_path_buf()),
            reference_path: None,
            confidence: 0.0,
            info: "No suitable match found".to_string(),
            status: MatchStatus::Unmatched,
        }
    }

    /// Reference nobody picked.
    pub fn reference_unused(reference: &Path) -> Self {
        Self {
            remux_path: None,
            reference_path: Some(reference.to_path_buf()),
            confidence: 0.0,
            info: "Reference file not used".to_string(),
            status: MatchStatus::ReferenceUnused,
        }
    }

    pub fn is_match(&self) -> bool {
        self.status == MatchStatus::Matched
    }
}

/// One item of a run's event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress { message: String, percent: u32 },
    Match(MatchEvent),
}

impl PipelineEvent {
    pub fn progress(message: impl Into<String>, percent: u32) -> Self {
        PipelineEvent::Progress {
            message: message.into(),
            percent: percent.min(100),
        }
    }

    pub fn as_match(&self) -> Option<&MatchEvent> {
        match self {
            PipelineEvent::Match(event) => Some(event),
            PipelineEvent::Progress { .. } => None,
        }
    }

    pub fn percent(&self) -> Option<u32> {
        match self {
            PipelineEvent::Progress { percent, .. } => Some(*percent),
            PipelineEvent::Match(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_threshold() {
        let remux = Path::new("/q/a.mkv");
        let reference = Path::new("/r/ep01.mkv");

        let high = MatchEvent::best(remux, reference, ScoreResult::new(0.9, "x"), 0.75);
        assert_eq!(high.status, MatchStatus::Matched);
        assert!(high.is_match());

        let low = MatchEvent::best(remux, reference, ScoreResult::new(0.5, "x"), 0.75);
        assert_eq!(low.status, MatchStatus::LowConfidence);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let progress = serde_json::to_value(PipelineEvent::progress("Matching complete", 100)).unwrap();
        assert_eq!(progress["kind"], "progress");
        assert_eq!(progress["percent"], 100);

        let unused = PipelineEvent::Match(MatchEvent::reference_unused(Path::new("/r/ep02.mkv")));
        let value = serde_json::to_value(unused).unwrap();
        assert_eq!(value["kind"], "match");
        assert_eq!(value["status"], "reference_unused");
        assert!(value["remux_path"].is_null());
    }

    #[test]
    fn progress_is_capped() {
        assert_eq!(PipelineEvent::progress("x", 150).percent(), Some(100));
    }
}
