//! Panako acoustic fingerprinting through the external jar.
//!
//! Each matcher owns a private Panako database in a temporary workspace.
//! References are stored once, remuxes are queried against everything
//! stored so far.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::{Matcher, MatcherContext, MatcherKind, RunFlag, ScoreResult};
use crate::error::{MatchError, MatchResult};
use crate::media::wav_path;

/// Sample rate of the WAV files handed to Panako.
const PANAKO_SAMPLE_RATE: u32 = 22050;

pub struct PanakoMatcher {
    ctx: MatcherContext,
    flag: RunFlag,
    /// Database root, removed when the matcher is dropped.
    workspace: Option<TempDir>,
    /// References already added to the database.
    stored: HashSet<PathBuf>,
}

impl PanakoMatcher {
    pub fn new(ctx: MatcherContext, flag: RunFlag) -> Self {
        Self {
            ctx,
            flag,
            workspace: None,
            stored: HashSet::new(),
        }
    }

    fn jar_available(&self) -> bool {
        self.ctx
            .settings
            .tools
            .panako_jar_path()
            .is_some_and(|jar| jar.exists())
    }

    /// Workspace root, created on first use.
    fn workspace(&mut self) -> MatchResult<PathBuf> {
        if let Some(dir) = &self.workspace {
            return Ok(dir.path().to_path_buf());
        }

        fs::create_dir_all(&self.ctx.workspace_dir).map_err(|e| MatchError::decode(e.to_string()))?;
        let dir = tempfile::Builder::new()
            .prefix("panako_")
            .tempdir_in(&self.ctx.workspace_dir)
            .map_err(|e| MatchError::decode(e.to_string()))?;
        fs::create_dir_all(dir.path().join("wav")).map_err(|e| MatchError::decode(e.to_string()))?;

        debug!("Panako workspace at {}", dir.path().display());
        let root = dir.path().to_path_buf();
        self.workspace = Some(dir);
        Ok(root)
    }

    fn prepare_wav(
        &self,
        workspace: &Path,
        path: &Path,
        language: Option<&str>,
        prefix: &str,
    ) -> MatchResult<PathBuf> {
        let stream = self.ctx.audio_stream_index(path, language)?;
        let wav = wav_path(&workspace.join("wav"), prefix, path);
        self.ctx
            .backend
            .decode_audio_to_file(path, stream, PANAKO_SAMPLE_RATE, &wav)?;
        Ok(wav)
    }
}

impl Matcher for PanakoMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Panako
    }

    fn compare(&mut self, reference: &Path, remux: &Path, language: Option<&str>) -> ScoreResult {
        if !self.jar_available() {
            return ScoreResult::failed("Panako not available");
        }
        let workspace = match self.workspace() {
            Ok(workspace) => workspace,
            Err(e) => return ScoreResult::failed(format!("Panako workspace: {e}")),
        };

        let Ok(ref_wav) = self.prepare_wav(&workspace, reference, language, "ref") else {
            return ScoreResult::failed("Failed to prepare reference audio");
        };

        if !self.stored.contains(reference) {
            if let Err(e) = self.ctx.backend.panako_store(&workspace, &ref_wav) {
                debug!("Panako store failed for {}: {e}", reference.display());
                return ScoreResult::failed("Failed to store reference");
            }
            self.stored.insert(reference.to_path_buf());
        }

        let Ok(query_wav) = self.prepare_wav(&workspace, remux, language, "query") else {
            return ScoreResult::failed("Failed to prepare query audio");
        };

        let hit = match self.ctx.backend.panako_query(&workspace, &query_wav) {
            Ok(Some(hit)) => hit,
            Ok(None) => return ScoreResult::no_evidence("No match found"),
            Err(e) => {
                debug!("Panako query failed for {}: {e}", remux.display());
                return ScoreResult::failed("Panako query failed");
            }
        };

        // The database holds every stored reference; only a hit on this one counts
        if Path::new(&hit.match_path).file_name() != ref_wav.file_name() {
            return ScoreResult::no_evidence(format!(
                "Matched different reference ({})",
                hit.match_path
            ));
        }

        ScoreResult::new(
            hit.confidence(),
            format!(
                "Panako: time_factor={:.2}, score={}",
                hit.time_factor, hit.score
            ),
        )
    }

    fn run_flag(&self) -> &RunFlag {
        &self.flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::RgbImage;
    use parking_lot::Mutex;

    use crate::cache::MediaCache;
    use crate::config::Settings;
    use crate::media::{
        AudioSamples, AudioWindow, MediaBackend, MediaResult, PanakoMatch, StreamDescriptor,
    };

    #[derive(Default)]
    struct PanakoBackend {
        stored: Mutex<Vec<PathBuf>>,
    }

    impl MediaBackend for PanakoBackend {
        fn probe_streams(&self, _path: &Path) -> MediaResult<Vec<StreamDescriptor>> {
            Ok(vec![StreamDescriptor::audio(1)])
        }

        fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(1200.0)
        }

        fn decode_audio(
            &self,
            _path: &Path,
            _stream_index: usize,
            sample_rate: u32,
            _window: AudioWindow,
        ) -> MediaResult<AudioSamples> {
            Ok(AudioSamples::new(Vec::new(), sample_rate))
        }

        fn decode_audio_to_file(
            &self,
            _path: &Path,
            _stream_index: usize,
            _sample_rate: u32,
            output: &Path,
        ) -> MediaResult<()> {
            fs::write(output, b"RIFF")?;
            Ok(())
        }

        fn decode_frames(&self, _path: &Path, _timestamps: &[f64]) -> MediaResult<Vec<RgbImage>> {
            Ok(Vec::new())
        }

        fn extract_chromaprint(
            &self,
            _path: &Path,
            _stream_index: usize,
            _window: AudioWindow,
        ) -> MediaResult<String> {
            Ok(String::new())
        }

        fn detect_scene_cuts(&self, _path: &Path, _threshold: f64) -> MediaResult<Vec<f64>> {
            Ok(Vec::new())
        }

        fn panako_store(&self, _workspace: &Path, wav: &Path) -> MediaResult<()> {
            self.stored.lock().push(wav.to_path_buf());
            Ok(())
        }

        /// Always reports the most recently stored file.
        fn panako_query(&self, _workspace: &Path, _wav: &Path) -> MediaResult<Option<PanakoMatch>> {
            Ok(self.stored.lock().last().map(|wav| PanakoMatch {
                match_path: wav.display().to_string(),
                score: 100,
                time_factor: 1.0,
                freq_factor: 1.0,
                coverage: 1.0,
            }))
        }
    }

    fn matcher(jar: &str, dir: &Path, backend: Arc<PanakoBackend>) -> PanakoMatcher {
        let mut settings = Settings::default();
        settings.tools.panako_jar = jar.to_string();
        let ctx = MatcherContext::new(
            Arc::new(MediaCache::new()),
            backend,
            Arc::new(settings),
            dir.join("scratch"),
        );
        PanakoMatcher::new(ctx, RunFlag::new())
    }

    #[test]
    fn missing_jar_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = matcher("", dir.path(), Arc::default());
        let result = m.compare(Path::new("/r/ep01.mkv"), Path::new("/q/a.mkv"), None);
        assert!(result.is_failed());
        assert_eq!(result.info, "Panako not available");
    }

    #[test]
    fn stores_each_reference_once() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("panako.jar");
        fs::write(&jar, b"jar").unwrap();

        let backend = Arc::new(PanakoBackend::default());
        let mut m = matcher(&jar.display().to_string(), dir.path(), Arc::clone(&backend));

        let first = m.compare(Path::new("/r/ep01.mkv"), Path::new("/q/a.mkv"), None);
        assert!((first.confidence - 1.0).abs() < 1e-9);
        assert!(first.info.starts_with("Panako: time_factor=1.00"));

        m.compare(Path::new("/r/ep01.mkv"), Path::new("/q/b.mkv"), None);
        assert_eq!(backend.stored.lock().len(), 1);
    }

    #[test]
    fn hit_on_another_reference_is_not_a_match() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("panako.jar");
        fs::write(&jar, b"jar").unwrap();

        let backend = Arc::new(PanakoBackend::default());
        let mut m = matcher(&jar.display().to_string(), dir.path(), Arc::clone(&backend));

        m.compare(Path::new("/r/ep01.mkv"), Path::new("/q/a.mkv"), None);
        m.compare(Path::new("/r/ep02.mkv"), Path::new("/q/a.mkv"), None);
        // ep02 is now the latest stored file, so re-querying ep01 hits ep02
        let result = m.compare(Path::new("/r/ep01.mkv"), Path::new("/q/a.mkv"), None);
        assert_eq!(result.confidence, 0.0);
        assert!(result.info.starts_with("Matched different reference"));
    }
}
