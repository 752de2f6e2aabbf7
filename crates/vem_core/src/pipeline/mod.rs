//! Matching pipeline.
//!
//! Pairs every remux with its best-scoring reference using one matcher
//! mode, and reports the outcome as an ordered event stream.
//!
//! # Strategies
//!
//! ```text
//! Exhaustive        compare(ref, remux) for each pair        progress 0..100
//! FingerprintBatch  fingerprint each file                    progress 0..50
//!                   compare fingerprints per remux           "Comparing fingerprints"
//! ```
//!
//! Both end with one match event per remux, one event per unused
//! reference, and a final 100% progress event.
//!
//! # Example
//!
//! ```ignore
//! use vem_core::pipeline::{spawn_run, MatchingPipeline};
//!
//! let mut pipeline = MatchingPipeline::new(cache, backend, settings, work_dir);
//! pipeline.set_mode("chromaprint");
//! let run = pipeline.start(references, remuxes);
//! let (events, handle) = spawn_run(run);
//! for event in events {
//!     // render progress / results
//! }
//! ```

mod errors;
mod events;
mod run;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

pub use errors::{PipelineError, PipelineResult};
pub use events::{MatchEvent, MatchStatus, PipelineEvent};
pub use run::{MatchRun, RunState, StopHandle};
pub use worker::spawn_run;

use crate::cache::MediaCache;
use crate::config::Settings;
use crate::matchers::{create_matcher, MatcherContext, MatcherKind, RunFlag};
use crate::media::MediaBackend;
use run::RunOptions;

/// Configures and starts matching runs.
pub struct MatchingPipeline {
    cache: Arc<MediaCache>,
    backend: Arc<dyn MediaBackend>,
    settings: Arc<Settings>,
    workspace_dir: PathBuf,
    mode: String,
    language: Option<String>,
    threshold: f64,
    /// Flag of the most recently started run.
    active: Arc<Mutex<Option<RunFlag>>>,
}

impl MatchingPipeline {
    /// Mode, language, and threshold start from `settings.matching`.
    pub fn new(
        cache: Arc<MediaCache>,
        backend: Arc<dyn MediaBackend>,
        settings: Settings,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        let mode = settings.matching.mode.clone();
        let language = settings.language().map(str::to_lowercase);
        let threshold = settings.matching.confidence_threshold;
        Self {
            cache,
            backend,
            settings: Arc::new(settings),
            workspace_dir: workspace_dir.into(),
            mode,
            language,
            threshold,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Pipeline with a fresh cache sized by `settings.cache`.
    pub fn from_settings(
        backend: Arc<dyn MediaBackend>,
        settings: Settings,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        let cache = Arc::new(MediaCache::from_settings(&settings.cache));
        Self::new(cache, backend, settings, workspace_dir)
    }

    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
    }

    /// Language filter; blank clears it.
    pub fn set_language(&mut self, language: Option<&str>) {
        self.language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    /// Matcher selected by the current mode.
    pub fn matcher_kind(&self) -> PipelineResult<MatcherKind> {
        MatcherKind::from_mode(&self.mode).ok_or_else(|| PipelineError::invalid_mode(&self.mode))
    }

    /// Start a run over the given files. Nothing happens until the
    /// returned run is iterated.
    pub fn start(&self, references: Vec<PathBuf>, remuxes: Vec<PathBuf>) -> MatchRun {
        let flag = RunFlag::new();
        *self.active.lock() = Some(flag.clone());

        let ctx = MatcherContext::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.backend),
            Arc::clone(&self.settings),
            self.workspace_dir.clone(),
        );
        let matcher = self
            .matcher_kind()
            .map(|kind| create_matcher(kind, ctx, flag.clone()));

        MatchRun::new(
            matcher,
            Arc::clone(&self.cache),
            flag,
            references,
            remuxes,
            RunOptions {
                language: self.language.clone(),
                threshold: self.threshold,
                duration_tolerance: self.settings.matching.duration_tolerance_secs,
            },
        )
    }

    /// Stop the most recently started run; idempotent.
    pub fn stop(&self) {
        if let Some(flag) = self.active.lock().as_ref() {
            flag.stop();
        }
    }
}
