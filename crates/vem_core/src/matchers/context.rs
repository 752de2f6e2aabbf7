//! Shared handles and helpers every matcher is built with.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{AudioKey, MediaCache};
use crate::config::Settings;
use crate::error::{MatchError, MatchResult};
use crate::media::{select_audio_stream, AudioSamples, AudioWindow, MediaBackend, StreamDescriptor};

/// Cache, backend, settings, and scratch directory for one matcher.
#[derive(Clone)]
pub struct MatcherContext {
    pub cache: Arc<MediaCache>,
    pub backend: Arc<dyn MediaBackend>,
    pub settings: Arc<Settings>,
    /// Parent directory for matcher scratch files.
    pub workspace_dir: PathBuf,
}

impl MatcherContext {
    pub fn new(
        cache: Arc<MediaCache>,
        backend: Arc<dyn MediaBackend>,
        settings: Arc<Settings>,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            backend,
            settings,
            workspace_dir: workspace_dir.into(),
        }
    }

    /// Stream list, probed once per file.
    pub fn streams(&self, path: &Path) -> MatchResult<Arc<Vec<StreamDescriptor>>> {
        if let Some(streams) = self.cache.get_streams(path) {
            return Ok(streams);
        }
        let streams = self.backend.probe_streams(path)?;
        Ok(self.cache.set_streams(path, streams))
    }

    /// Absolute index of the audio stream to analyze.
    pub fn audio_stream_index(&self, path: &Path, language: Option<&str>) -> MatchResult<usize> {
        let streams = self.streams(path)?;
        select_audio_stream(&streams, language).ok_or(MatchError::NoAudioStream)
    }

    /// Container duration, probed once per file.
    pub fn duration(&self, path: &Path) -> MatchResult<f64> {
        if let Some(duration) = self.cache.get_duration(path) {
            return Ok(duration);
        }
        let duration = self.backend.probe_duration(path)?;
        self.cache.set_duration(path, duration);
        Ok(duration)
    }

    /// Window used by the fingerprinting matchers: starts at the configured
    /// fraction of the duration and lasts at most the analysis length.
    pub fn analysis_window(&self, path: &Path) -> MatchResult<AudioWindow> {
        let duration = self.duration(path)?;
        let start = duration * self.settings.audio_start_fraction();
        Ok(AudioWindow::new(
            start,
            Some(self.settings.spectral.analysis_duration_secs),
        ))
    }

    /// Decoded audio, served from the cache when possible.
    pub fn audio(
        &self,
        path: &Path,
        stream_index: usize,
        sample_rate: u32,
        window: AudioWindow,
    ) -> MatchResult<Arc<AudioSamples>> {
        let key = AudioKey::new(path, stream_index, sample_rate, window);
        if let Some(audio) = self.cache.get_audio(&key) {
            return Ok(audio);
        }

        let audio = self
            .backend
            .decode_audio(path, stream_index, sample_rate, window)?;
        if audio.is_empty() {
            return Err(MatchError::decode(format!(
                "no samples decoded from {}",
                path.display()
            )));
        }
        Ok(self.cache.set_audio(key, audio))
    }
}
