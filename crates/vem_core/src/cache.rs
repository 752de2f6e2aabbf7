//! Shared cache of probed and decoded media.
//!
//! One `MediaCache` is shared (via `Arc`) by the pipeline and every matcher
//! it creates. Metadata and fingerprint maps grow without bound; decoded
//! audio is held under a byte budget with first-in-first-out eviction.
//!
//! Entries are handed out as `Arc`s so an evicted buffer stays valid for
//! whoever is still reading it.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CacheSettings;
use crate::matchers::FrameHashes;
use crate::media::{AudioSamples, AudioWindow, StreamDescriptor};

/// Default audio budget (500 MiB).
pub const DEFAULT_AUDIO_BUDGET_BYTES: usize = 500 * 1024 * 1024;

/// Identity of one decoded audio buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioKey {
    pub path: PathBuf,
    pub stream_index: usize,
    pub sample_rate: u32,
    pub window: AudioWindow,
}

impl AudioKey {
    pub fn new(path: &Path, stream_index: usize, sample_rate: u32, window: AudioWindow) -> Self {
        Self {
            path: path.to_path_buf(),
            stream_index,
            sample_rate,
            window,
        }
    }
}

/// Entry counts and audio usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub durations: usize,
    pub stream_lists: usize,
    pub audio_entries: usize,
    pub audio_bytes: usize,
    pub video_hashes: usize,
    pub scenes: usize,
    pub chromaprints: usize,
    pub mfccs: usize,
}

#[derive(Default)]
struct CacheInner {
    durations: HashMap<PathBuf, f64>,
    streams: HashMap<PathBuf, Arc<Vec<StreamDescriptor>>>,
    audio: HashMap<AudioKey, Arc<AudioSamples>>,
    /// Insertion order of `audio` keys, oldest first.
    audio_order: VecDeque<AudioKey>,
    audio_bytes: usize,
    video_hashes: HashMap<(PathBuf, String), Arc<Vec<FrameHashes>>>,
    scenes: HashMap<PathBuf, Arc<Vec<f64>>>,
    chromaprints: HashMap<(PathBuf, usize), Arc<str>>,
    mfccs: HashMap<(PathBuf, usize), Arc<Vec<f64>>>,
}

/// Thread-safe cache for media metadata, decoded audio, and fingerprints.
pub struct MediaCache {
    inner: Mutex<CacheInner>,
    audio_budget_bytes: usize,
}

impl Default for MediaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaCache {
    /// Cache with the default 500 MiB audio budget.
    pub fn new() -> Self {
        Self::with_audio_budget(DEFAULT_AUDIO_BUDGET_BYTES)
    }

    /// Cache with a custom audio budget in bytes.
    pub fn with_audio_budget(audio_budget_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            audio_budget_bytes,
        }
    }

    /// Cache sized by the `[cache]` section.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::with_audio_budget(settings.audio_budget_bytes())
    }

    pub fn audio_budget_bytes(&self) -> usize {
        self.audio_budget_bytes
    }

    /// Bytes currently held by cached audio.
    pub fn audio_bytes(&self) -> usize {
        self.inner.lock().audio_bytes
    }

    // Durations

    pub fn get_duration(&self, path: &Path) -> Option<f64> {
        self.inner.lock().durations.get(path).copied()
    }

    pub fn set_duration(&self, path: &Path, duration: f64) {
        self.inner.lock().durations.insert(path.to_path_buf(), duration);
    }

    // Stream lists

    pub fn get_streams(&self, path: &Path) -> Option<Arc<Vec<StreamDescriptor>>> {
        self.inner.lock().streams.get(path).cloned()
    }

    pub fn set_streams(&self, path: &Path, streams: Vec<StreamDescriptor>) -> Arc<Vec<StreamDescriptor>> {
        let streams = Arc::new(streams);
        self.inner
            .lock()
            .streams
            .insert(path.to_path_buf(), Arc::clone(&streams));
        streams
    }

    // Decoded audio

    pub fn get_audio(&self, key: &AudioKey) -> Option<Arc<AudioSamples>> {
        self.inner.lock().audio.get(key).cloned()
    }

    /// Store a decoded buffer, evicting the oldest buffers until it fits.
    ///
    /// A buffer larger than the whole budget empties the audio cache and is
    /// stored anyway.
    pub fn set_audio(&self, key: AudioKey, audio: AudioSamples) -> Arc<AudioSamples> {
        let audio = Arc::new(audio);
        let needed = audio.byte_size();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(previous) = inner.audio.remove(&key) {
            inner.audio_bytes -= previous.byte_size();
            inner.audio_order.retain(|k| k != &key);
        }

        while inner.audio_bytes + needed > self.audio_budget_bytes {
            let Some(oldest) = inner.audio_order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.audio.remove(&oldest) {
                inner.audio_bytes -= evicted.byte_size();
                tracing::debug!(
                    "Evicted {} bytes of audio for {} (stream {})",
                    evicted.byte_size(),
                    oldest.path.display(),
                    oldest.stream_index
                );
            }
        }

        inner.audio_order.push_back(key.clone());
        inner.audio.insert(key, Arc::clone(&audio));
        inner.audio_bytes += needed;

        audio
    }

    // Video frame hashes

    pub fn get_video_hashes(&self, path: &Path, method: &str) -> Option<Arc<Vec<FrameHashes>>> {
        self.inner
            .lock()
            .video_hashes
            .get(&(path.to_path_buf(), method.to_string()))
            .cloned()
    }

    pub fn set_video_hashes(
        &self,
        path: &Path,
        method: &str,
        hashes: Vec<FrameHashes>,
    ) -> Arc<Vec<FrameHashes>> {
        let hashes = Arc::new(hashes);
        self.inner.lock().video_hashes.insert(
            (path.to_path_buf(), method.to_string()),
            Arc::clone(&hashes),
        );
        hashes
    }

    // Scene durations

    pub fn get_scenes(&self, path: &Path) -> Option<Arc<Vec<f64>>> {
        self.inner.lock().scenes.get(path).cloned()
    }

    pub fn set_scenes(&self, path: &Path, durations: Vec<f64>) -> Arc<Vec<f64>> {
        let durations = Arc::new(durations);
        self.inner
            .lock()
            .scenes
            .insert(path.to_path_buf(), Arc::clone(&durations));
        durations
    }

    // Chromaprint strings

    pub fn get_chromaprint(&self, path: &Path, stream_index: usize) -> Option<Arc<str>> {
        self.inner
            .lock()
            .chromaprints
            .get(&(path.to_path_buf(), stream_index))
            .cloned()
    }

    pub fn set_chromaprint(&self, path: &Path, stream_index: usize, fingerprint: &str) -> Arc<str> {
        let fingerprint: Arc<str> = Arc::from(fingerprint);
        self.inner
            .lock()
            .chromaprints
            .insert((path.to_path_buf(), stream_index), Arc::clone(&fingerprint));
        fingerprint
    }

    // MFCC vectors

    pub fn get_mfcc(&self, path: &Path, stream_index: usize) -> Option<Arc<Vec<f64>>> {
        self.inner
            .lock()
            .mfccs
            .get(&(path.to_path_buf(), stream_index))
            .cloned()
    }

    pub fn set_mfcc(&self, path: &Path, stream_index: usize, features: Vec<f64>) -> Arc<Vec<f64>> {
        let features = Arc::new(features);
        self.inner
            .lock()
            .mfccs
            .insert((path.to_path_buf(), stream_index), Arc::clone(&features));
        features
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        *self.inner.lock() = CacheInner::default();
        tracing::debug!("Media cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            durations: inner.durations.len(),
            stream_lists: inner.streams.len(),
            audio_entries: inner.audio.len(),
            audio_bytes: inner.audio_bytes,
            video_hashes: inner.video_hashes.len(),
            scenes: inner.scenes.len(),
            chromaprints: inner.chromaprints.len(),
            mfccs: inner.mfccs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn buffer(bytes: usize) -> AudioSamples {
        AudioSamples::new(vec![0.0; bytes / 4], 48000)
    }

    fn key(name: &str) -> AudioKey {
        AudioKey::new(Path::new(name), 1, 48000, AudioWindow::FULL)
    }

    #[test]
    fn evicts_oldest_audio_first() {
        let cache = MediaCache::with_audio_budget(10 * MIB);
        cache.set_audio(key("a.mkv"), buffer(6 * MIB));
        cache.set_audio(key("b.mkv"), buffer(6 * MIB));
        cache.set_audio(key("c.mkv"), buffer(6 * MIB));

        assert!(cache.get_audio(&key("a.mkv")).is_none());
        assert!(cache.get_audio(&key("b.mkv")).is_none());
        assert!(cache.get_audio(&key("c.mkv")).is_some());
        assert_eq!(cache.audio_bytes(), 6 * MIB);
    }

    #[test]
    fn budget_comes_from_settings() {
        let settings = CacheSettings { audio_budget_mb: 10 };
        let cache = MediaCache::from_settings(&settings);
        assert_eq!(cache.audio_budget_bytes(), 10 * MIB);

        cache.set_audio(key("a.mkv"), buffer(6 * MIB));
        cache.set_audio(key("b.mkv"), buffer(6 * MIB));
        assert!(cache.get_audio(&key("a.mkv")).is_none());
    }

    #[test]
    fn keeps_entries_that_fit() {
        let cache = MediaCache::with_audio_budget(10 * MIB);
        cache.set_audio(key("a.mkv"), buffer(4 * MIB));
        cache.set_audio(key("b.mkv"), buffer(4 * MIB));
        cache.set_audio(key("c.mkv"), buffer(4 * MIB));

        assert!(cache.get_audio(&key("a.mkv")).is_none());
        assert!(cache.get_audio(&key("b.mkv")).is_some());
        assert!(cache.get_audio(&key("c.mkv")).is_some());
        assert_eq!(cache.audio_bytes(), 8 * MIB);
    }

    #[test]
    fn oversized_buffer_is_still_stored() {
        let cache = MediaCache::with_audio_budget(MIB);
        cache.set_audio(key("a.mkv"), buffer(MIB / 2));
        cache.set_audio(key("big.mkv"), buffer(2 * MIB));

        assert!(cache.get_audio(&key("a.mkv")).is_none());
        assert!(cache.get_audio(&key("big.mkv")).is_some());
        assert_eq!(cache.audio_bytes(), 2 * MIB);
    }

    #[test]
    fn replacing_a_key_does_not_double_count() {
        let cache = MediaCache::with_audio_budget(10 * MIB);
        cache.set_audio(key("a.mkv"), buffer(3 * MIB));
        cache.set_audio(key("a.mkv"), buffer(5 * MIB));

        assert_eq!(cache.audio_bytes(), 5 * MIB);
        assert_eq!(cache.stats().audio_entries, 1);
    }

    #[test]
    fn window_is_part_of_the_audio_key() {
        let cache = MediaCache::new();
        let full = key("a.mkv");
        let windowed = AudioKey::new(Path::new("a.mkv"), 1, 48000, AudioWindow::new(30.0, Some(120.0)));
        cache.set_audio(full.clone(), buffer(1024));

        assert!(cache.get_audio(&full).is_some());
        assert!(cache.get_audio(&windowed).is_none());
    }

    #[test]
    fn evicted_buffer_stays_valid_for_holders() {
        let cache = MediaCache::with_audio_budget(MIB);
        let held = cache.set_audio(key("a.mkv"), buffer(MIB));
        cache.set_audio(key("b.mkv"), buffer(MIB));

        assert!(cache.get_audio(&key("a.mkv")).is_none());
        assert_eq!(held.byte_size(), MIB);
    }

    #[test]
    fn metadata_round_trips() {
        let cache = MediaCache::new();
        let path = Path::new("/media/ep01.mkv");

        cache.set_duration(path, 1420.5);
        cache.set_streams(path, vec![StreamDescriptor::audio(1)]);
        cache.set_chromaprint(path, 1, "1,2,3");
        cache.set_mfcc(path, 1, vec![0.5; 13]);
        cache.set_scenes(path, vec![10.0, 20.0]);

        assert_eq!(cache.get_duration(path), Some(1420.5));
        assert_eq!(cache.get_streams(path).unwrap().len(), 1);
        assert_eq!(cache.get_chromaprint(path, 1).as_deref(), Some("1,2,3"));
        assert!(cache.get_chromaprint(path, 2).is_none());
        assert_eq!(cache.get_mfcc(path, 1).unwrap().len(), 13);
        assert_eq!(cache.get_scenes(path).unwrap().as_slice(), &[10.0, 20.0]);
    }

    #[test]
    fn clear_empties_everything() {
        let cache = MediaCache::new();
        let path = Path::new("a.mkv");
        cache.set_duration(path, 1.0);
        cache.set_audio(key("a.mkv"), buffer(1024));
        cache.set_video_hashes(path, "phash", Vec::new());

        let before = cache.stats();
        assert_eq!(before.durations, 1);
        assert_eq!(before.video_hashes, 1);

        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
