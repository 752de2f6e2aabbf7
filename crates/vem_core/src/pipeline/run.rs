//! One matching run, driven as an iterator of events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::PipelineResult;
use super::events::{MatchEvent, PipelineEvent};
use crate::cache::MediaCache;
use crate::matchers::{Fingerprint, MatchStrategy, Matcher, MatcherKind, RunFlag, ScoreResult};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, no event pulled yet.
    Idle,
    Running,
    Completed,
    Stopped,
    /// The mode named no matcher.
    Aborted,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Stopped | RunState::Aborted
        )
    }
}

/// Handle for stopping a run from another thread.
///
/// The run stops at the next comparison boundary.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: RunFlag,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.stop();
    }

    pub fn is_stopped(&self) -> bool {
        !self.flag.is_running()
    }
}

/// Per-run knobs copied from the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct RunOptions {
    pub language: Option<String>,
    pub threshold: f64,
    pub duration_tolerance: f64,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    /// Next pair to compare, counted remux-major.
    Exhaustive { pair: usize },
    /// Next file to fingerprint, references first.
    Extract { index: usize },
    /// Next remux to compare against all reference fingerprints.
    CompareFingerprints { remux: usize },
    Report,
    Finished,
}

/// Event stream of a single run.
///
/// Work happens lazily inside `next`: each call advances by at most one
/// comparison unit (one pair, one file, or one remux) before yielding the
/// events it produced.
pub struct MatchRun {
    matcher: PipelineResult<Box<dyn Matcher>>,
    cache: Arc<MediaCache>,
    flag: RunFlag,
    references: Vec<PathBuf>,
    remuxes: Vec<PathBuf>,
    options: RunOptions,
    state: RunState,
    phase: Phase,
    pending: VecDeque<PipelineEvent>,
    /// Best (reference index, score) per remux.
    best: Vec<Option<(usize, ScoreResult)>>,
    reference_prints: Vec<Option<Fingerprint>>,
    remux_prints: Vec<Option<Fingerprint>>,
}

impl MatchRun {
    pub(crate) fn new(
        matcher: PipelineResult<Box<dyn Matcher>>,
        cache: Arc<MediaCache>,
        flag: RunFlag,
        references: Vec<PathBuf>,
        remuxes: Vec<PathBuf>,
        options: RunOptions,
    ) -> Self {
        let best = vec![None; remuxes.len()];
        Self {
            matcher,
            cache,
            flag,
            references,
            remuxes,
            options,
            state: RunState::Idle,
            phase: Phase::Start,
            pending: VecDeque::new(),
            best,
            reference_prints: Vec::new(),
            remux_prints: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Matcher kind, unless the mode was invalid.
    pub fn kind(&self) -> Option<MatcherKind> {
        self.matcher.as_ref().ok().map(|m| m.kind())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.flag.clone(),
        }
    }

    /// Request a stop; idempotent.
    pub fn stop(&self) {
        self.flag.stop();
    }

    fn step(&mut self) {
        match self.phase {
            Phase::Start => self.begin(),
            Phase::Finished => {}
            _ if !self.flag.is_running() => self.finish_stopped(),
            Phase::Exhaustive { pair } => self.compare_pair(pair),
            Phase::Extract { index } => self.extract(index),
            Phase::CompareFingerprints { remux } => self.compare_fingerprints(remux),
            Phase::Report => self.report(),
        }
    }

    fn begin(&mut self) {
        let matcher = match self.matcher.as_mut() {
            Ok(matcher) => matcher,
            Err(e) => {
                let message = e.to_string();
                warn!("{}", message);
                self.pending.push_back(PipelineEvent::progress(message, 0));
                self.state = RunState::Aborted;
                self.phase = Phase::Finished;
                return;
            }
        };

        let kind = matcher.kind();
        info!(
            "Starting {} matching: {} references, {} remuxes",
            kind.id(),
            self.references.len(),
            self.remuxes.len()
        );

        let batch =
            kind.strategy() == MatchStrategy::FingerprintBatch && matcher.fingerprinter().is_some();
        self.phase = if batch {
            Phase::Extract { index: 0 }
        } else {
            Phase::Exhaustive { pair: 0 }
        };
        self.state = RunState::Running;
        self.pending.push_back(PipelineEvent::progress(
            format!("Starting {} matching...", kind.label()),
            0,
        ));
    }

    fn compare_pair(&mut self, pair: usize) {
        let total = self.references.len() * self.remuxes.len();
        if pair >= total {
            self.phase = Phase::Report;
            return;
        }
        let Ok(matcher) = self.matcher.as_mut() else {
            self.phase = Phase::Finished;
            return;
        };

        let (m, r) = (pair / self.references.len(), pair % self.references.len());
        let remux = &self.remuxes[m];
        let reference = &self.references[r];

        if durations_compatible(&self.cache, reference, remux, self.options.duration_tolerance) {
            let score = matcher.compare(reference, remux, self.options.language.as_deref());
            debug!(
                "{} vs {}: {:.3} ({})",
                file_name(reference),
                file_name(remux),
                score.confidence,
                score.info
            );
            consider(&mut self.best[m], r, score);
        } else {
            debug!(
                "Skipping {} vs {}: durations differ",
                file_name(reference),
                file_name(remux)
            );
        }

        let done = pair + 1;
        self.pending.push_back(PipelineEvent::progress(
            format!(
                "Compared {} with {} ({}/{})",
                file_name(remux),
                file_name(reference),
                done,
                total
            ),
            percent(done, total, 100),
        ));
        self.phase = Phase::Exhaustive { pair: done };
    }

    fn extract(&mut self, index: usize) {
        let n_refs = self.references.len();
        let total = n_refs + self.remuxes.len();
        if index >= total {
            self.pending
                .push_back(PipelineEvent::progress("Comparing fingerprints", 50));
            self.phase = Phase::CompareFingerprints { remux: 0 };
            return;
        }
        let Some(fingerprinter) = self.matcher.as_mut().ok().and_then(|m| m.fingerprinter()) else {
            self.phase = Phase::Finished;
            return;
        };

        let path = if index < n_refs {
            &self.references[index]
        } else {
            &self.remuxes[index - n_refs]
        };

        let print = match fingerprinter.fingerprint(path, self.options.language.as_deref()) {
            Ok(print) => Some(print),
            Err(e) => {
                debug!("Fingerprint failed for {}: {}", path.display(), e);
                None
            }
        };
        let message = match print {
            Some(_) => format!("Fingerprinted {} ({}/{})", file_name(path), index + 1, total),
            None => format!("Failed to fingerprint {}", file_name(path)),
        };

        if index < n_refs {
            self.reference_prints.push(print);
        } else {
            self.remux_prints.push(print);
        }
        self.pending
            .push_back(PipelineEvent::progress(message, percent(index + 1, total, 50)));
        self.phase = Phase::Extract { index: index + 1 };
    }

    fn compare_fingerprints(&mut self, m: usize) {
        if m >= self.remuxes.len() {
            self.phase = Phase::Report;
            return;
        }
        let Ok(matcher) = self.matcher.as_mut() else {
            self.phase = Phase::Finished;
            return;
        };
        let label = matcher.kind().label();
        let Some(fingerprinter) = matcher.fingerprinter() else {
            self.phase = Phase::Finished;
            return;
        };

        if let Some(Some(remux_print)) = self.remux_prints.get(m) {
            let remux = &self.remuxes[m];
            for (r, reference_print) in self.reference_prints.iter().enumerate() {
                let Some(reference_print) = reference_print else {
                    continue;
                };
                let reference = &self.references[r];
                if !durations_compatible(&self.cache, reference, remux, self.options.duration_tolerance)
                {
                    continue;
                }

                let similarity = fingerprinter.compare_fingerprints(reference_print, remux_print);
                if similarity < 0.0 {
                    continue;
                }
                consider(
                    &mut self.best[m],
                    r,
                    ScoreResult::new(similarity, format!("{label} fingerprint similarity")),
                );
            }
        }

        self.phase = Phase::CompareFingerprints { remux: m + 1 };
    }

    fn report(&mut self) {
        let mut used = vec![false; self.references.len()];
        let mut matched = 0;

        for (m, best) in self.best.iter_mut().enumerate() {
            let remux = &self.remuxes[m];
            let event = match best.take() {
                Some((r, score)) => {
                    used[r] = true;
                    MatchEvent::best(remux, &self.references[r], score, self.options.threshold)
                }
                None => MatchEvent::unmatched(remux),
            };
            if event.is_match() {
                matched += 1;
            }
            self.pending.push_back(PipelineEvent::Match(event));
        }

        for (reference, used) in self.references.iter().zip(used) {
            if !used {
                self.pending
                    .push_back(PipelineEvent::Match(MatchEvent::reference_unused(reference)));
            }
        }

        info!(
            "Matching complete: {}/{} remuxes matched",
            matched,
            self.remuxes.len()
        );
        self.pending
            .push_back(PipelineEvent::progress("Matching complete", 100));
        self.state = RunState::Completed;
        self.phase = Phase::Finished;
    }

    /// A stopped run reports nothing further but still closes at 100%.
    fn finish_stopped(&mut self) {
        info!("Matching stopped");
        self.pending
            .push_back(PipelineEvent::progress("Matching complete", 100));
        self.state = RunState::Stopped;
        self.phase = Phase::Finished;
    }
}

impl Iterator for MatchRun {
    type Item = PipelineEvent;

    fn next(&mut self) -> Option<PipelineEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if matches!(self.phase, Phase::Finished) {
                return None;
            }
            self.step();
        }
    }
}

/// Keep `score` if it is usable and strictly beats the current best.
fn consider(best: &mut Option<(usize, ScoreResult)>, reference: usize, score: ScoreResult) {
    if score.is_failed() {
        return;
    }
    let better = match best {
        Some((_, current)) => score.confidence > current.confidence,
        None => true,
    };
    if better {
        *best = Some((reference, score));
    }
}

/// False only when both durations are cached and differ by more than
/// `tolerance` seconds.
fn durations_compatible(cache: &MediaCache, a: &Path, b: &Path, tolerance: f64) -> bool {
    match (cache.get_duration(a), cache.get_duration(b)) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        _ => true,
    }
}

fn percent(done: usize, total: usize, scale: u32) -> u32 {
    if total == 0 {
        return scale;
    }
    ((done as f64 / total as f64) * scale as f64) as u32
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::MatchResult;
    use crate::matchers::Fingerprinter;
    use crate::pipeline::events::MatchStatus;
    use crate::pipeline::PipelineError;

    /// Scores pairs from a lookup table; unknown pairs score zero.
    struct TableMatcher {
        flag: RunFlag,
        scores: HashMap<(String, String), f64>,
        /// Stop the run after this many comparisons.
        stop_after: Option<usize>,
        calls: usize,
    }

    impl TableMatcher {
        fn new(flag: RunFlag, scores: &[(&str, &str, f64)]) -> Self {
            Self {
                flag,
                scores: scores
                    .iter()
                    .map(|(r, m, s)| ((r.to_string(), m.to_string()), *s))
                    .collect(),
                stop_after: None,
                calls: 0,
            }
        }
    }

    impl Matcher for TableMatcher {
        fn kind(&self) -> MatcherKind {
            MatcherKind::Correlation
        }

        fn compare(&mut self, reference: &Path, remux: &Path, _language: Option<&str>) -> ScoreResult {
            self.calls += 1;
            if self.stop_after == Some(self.calls) {
                self.flag.stop();
            }
            let key = (file_name(reference), file_name(remux));
            let score = self.scores.get(&key).copied().unwrap_or(0.0);
            ScoreResult::new(score, "table")
        }

        fn run_flag(&self) -> &RunFlag {
            &self.flag
        }
    }

    /// Fingerprints are the file name length; unreadable names fail.
    struct LengthPrinter {
        flag: RunFlag,
        /// Stop the run after this many fingerprints.
        stop_after: Option<usize>,
        calls: usize,
    }

    impl LengthPrinter {
        fn new(flag: RunFlag) -> Self {
            Self {
                flag,
                stop_after: None,
                calls: 0,
            }
        }
    }

    impl Matcher for LengthPrinter {
        fn kind(&self) -> MatcherKind {
            MatcherKind::Chromaprint
        }

        fn compare(&mut self, _reference: &Path, _remux: &Path, _language: Option<&str>) -> ScoreResult {
            ScoreResult::no_evidence("unused")
        }

        fn fingerprinter(&mut self) -> Option<&mut dyn Fingerprinter> {
            Some(self)
        }

        fn run_flag(&self) -> &RunFlag {
            &self.flag
        }
    }

    impl Fingerprinter for LengthPrinter {
        fn fingerprint(&mut self, path: &Path, _language: Option<&str>) -> MatchResult<Fingerprint> {
            self.calls += 1;
            if self.stop_after == Some(self.calls) {
                self.flag.stop();
            }
            let name = file_name(path);
            if name.starts_with("bad") {
                return Err(crate::error::MatchError::NoFingerprint);
            }
            Ok(Fingerprint::Chromaprint(vec![name.len() as u32]))
        }

        fn compare_fingerprints(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
            match (a, b) {
                (Fingerprint::Chromaprint(a), Fingerprint::Chromaprint(b)) if a == b => 1.0,
                _ => 0.2,
            }
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            language: None,
            threshold: 0.75,
            duration_tolerance: 5.0,
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/media/{n}"))).collect()
    }

    fn run_with(matcher: Box<dyn Matcher>, flag: RunFlag, cache: Arc<MediaCache>, refs: &[&str], remuxes: &[&str]) -> MatchRun {
        MatchRun::new(Ok(matcher), cache, flag, paths(refs), paths(remuxes), options())
    }

    fn matches(events: &[PipelineEvent]) -> Vec<&MatchEvent> {
        events.iter().filter_map(PipelineEvent::as_match).collect()
    }

    #[test]
    fn picks_best_reference_per_remux() {
        let flag = RunFlag::new();
        let matcher = TableMatcher::new(
            flag.clone(),
            &[("r1", "m1", 0.2), ("r2", "m1", 0.9), ("r1", "m2", 0.95), ("r2", "m2", 0.1)],
        );
        let mut run = run_with(Box::new(matcher), flag, Arc::default(), &["r1", "r2"], &["m1", "m2"]);
        let events: Vec<_> = run.by_ref().collect();

        let found = matches(&events);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].reference_path, Some(PathBuf::from("/media/r2")));
        assert_eq!(found[1].reference_path, Some(PathBuf::from("/media/r1")));
        assert!(found.iter().all(|e| e.status == MatchStatus::Matched));
        assert_eq!(run.state(), RunState::Completed);

        let last = events.last().unwrap();
        assert_eq!(last.percent(), Some(100));
    }

    #[test]
    fn progress_never_decreases() {
        let flag = RunFlag::new();
        let matcher = TableMatcher::new(flag.clone(), &[]);
        let run = run_with(Box::new(matcher), flag, Arc::default(), &["r1", "r2", "r3"], &["m1", "m2"]);

        let percents: Vec<u32> = run.filter_map(|e| e.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn two_remuxes_may_share_a_reference() {
        let flag = RunFlag::new();
        let matcher = TableMatcher::new(
            flag.clone(),
            &[("r1", "m1", 0.9), ("r1", "m2", 0.8), ("r2", "m1", 0.3), ("r2", "m2", 0.3)],
        );
        let events: Vec<_> =
            run_with(Box::new(matcher), flag, Arc::default(), &["r1", "r2"], &["m1", "m2"]).collect();

        let found = matches(&events);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].reference_path, found[1].reference_path);
        assert_eq!(found[2].status, MatchStatus::ReferenceUnused);
        assert_eq!(found[2].reference_path, Some(PathBuf::from("/media/r2")));
    }

    #[test]
    fn duration_filter_skips_pairs() {
        let cache = Arc::new(MediaCache::new());
        cache.set_duration(Path::new("/media/r1"), 1200.0);
        cache.set_duration(Path::new("/media/m1"), 1210.0);

        let flag = RunFlag::new();
        let matcher = TableMatcher::new(flag.clone(), &[("r1", "m1", 0.99)]);
        let events: Vec<_> = run_with(Box::new(matcher), flag, cache, &["r1"], &["m1"]).collect();

        let found = matches(&events);
        assert_eq!(found[0].status, MatchStatus::Unmatched);
        assert_eq!(found[1].status, MatchStatus::ReferenceUnused);
    }

    #[test]
    fn stop_ends_without_match_events() {
        let flag = RunFlag::new();
        let mut matcher = TableMatcher::new(flag.clone(), &[("r1", "m1", 0.9)]);
        matcher.stop_after = Some(1);

        let mut run = run_with(Box::new(matcher), flag, Arc::default(), &["r1", "r2"], &["m1", "m2"]);
        let events: Vec<_> = run.by_ref().collect();

        assert!(matches(&events).is_empty());
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::progress("Matching complete", 100))
        );
        assert_eq!(run.state(), RunState::Stopped);
    }

    #[test]
    fn invalid_mode_aborts_with_one_event() {
        let mut run = MatchRun::new(
            Err(PipelineError::invalid_mode("bogus")),
            Arc::default(),
            RunFlag::new(),
            paths(&["r1"]),
            paths(&["m1"]),
            options(),
        );
        let events: Vec<_> = run.by_ref().collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].percent(), Some(0));
        assert_eq!(run.state(), RunState::Aborted);
        assert_eq!(run.kind(), None);
    }

    #[test]
    fn batch_strategy_uses_fingerprints() {
        let flag = RunFlag::new();
        let matcher = LengthPrinter::new(flag.clone());
        // Names of equal length fingerprint identically
        let events: Vec<_> = run_with(
            Box::new(matcher),
            flag,
            Arc::default(),
            &["aa", "bbbb"],
            &["cccc", "bad1"],
        )
        .collect();

        assert!(events.contains(&PipelineEvent::progress("Comparing fingerprints", 50)));
        let found = matches(&events);
        assert_eq!(found[0].reference_path, Some(PathBuf::from("/media/bbbb")));
        assert_eq!(found[0].status, MatchStatus::Matched);
        assert_eq!(found[1].status, MatchStatus::Unmatched);
        assert_eq!(found[2].status, MatchStatus::ReferenceUnused);
        assert_eq!(found[2].reference_path, Some(PathBuf::from("/media/aa")));
    }

    #[test]
    fn stop_during_extraction_ends_without_match_events() {
        let flag = RunFlag::new();
        let mut matcher = LengthPrinter::new(flag.clone());
        matcher.stop_after = Some(1);

        let mut run = run_with(
            Box::new(matcher),
            flag,
            Arc::default(),
            &["aa", "bbbb"],
            &["cccc", "dd"],
        );
        let events: Vec<_> = run.by_ref().collect();

        assert!(matches(&events).is_empty());
        assert!(!events.contains(&PipelineEvent::progress("Comparing fingerprints", 50)));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::progress("Matching complete", 100))
        );
        assert_eq!(run.state(), RunState::Stopped);
    }
}
