//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Run-level matching options.
    #[serde(default)]
    pub matching: MatchingSettings,

    /// Shared media cache limits.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Chunked GCC-PHAT correlation.
    #[serde(default)]
    pub correlation: CorrelationSettings,

    /// Analysis window shared by MFCC and landmark hashing.
    #[serde(default)]
    pub spectral: SpectralSettings,

    /// Perceptual frame hashing.
    #[serde(default)]
    pub video: VideoSettings,

    /// Scene-cut rhythm comparison.
    #[serde(default)]
    pub scene: SceneSettings,

    /// External tool locations and timeouts.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Audio analysis start as a fraction of duration, clamped to 0-0.9.
    pub fn audio_start_fraction(&self) -> f64 {
        clamp_percent(self.matching.analysis_start_percent, 90.0) / 100.0
    }

    /// Fraction trimmed from each end when sampling video frames, capped at 0.4.
    pub fn video_edge_fraction(&self) -> f64 {
        clamp_percent(self.matching.analysis_start_percent, 40.0) / 100.0
    }

    /// Requested stream language, if any.
    pub fn language(&self) -> Option<&str> {
        let language = self.matching.language.trim();
        (!language.is_empty()).then_some(language)
    }
}

fn clamp_percent(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Run-level matching options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Matcher mode id (correlation, chromaprint, mfcc, peak, invariant,
    /// panako, phash, scene).
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Preferred audio language tag; empty for none.
    #[serde(default)]
    pub language: String,

    /// Minimum confidence for a pairing to count as matched.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Where audio analysis starts, as percent of duration.
    #[serde(default = "default_analysis_start_percent")]
    pub analysis_start_percent: f64,

    /// Pairs whose cached durations differ by more than this are skipped.
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_secs: f64,
}

fn default_mode() -> String {
    "correlation".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn default_analysis_start_percent() -> f64 {
    15.0
}

fn default_duration_tolerance() -> f64 {
    5.0
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            language: String::new(),
            confidence_threshold: default_confidence_threshold(),
            analysis_start_percent: default_analysis_start_percent(),
            duration_tolerance_secs: default_duration_tolerance(),
        }
    }
}

/// Media cache limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Budget for decoded audio buffers in MiB.
    #[serde(default = "default_audio_budget_mb")]
    pub audio_budget_mb: usize,
}

fn default_audio_budget_mb() -> usize {
    500
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            audio_budget_mb: default_audio_budget_mb(),
        }
    }
}

impl CacheSettings {
    pub fn audio_budget_bytes(&self) -> usize {
        self.audio_budget_mb.saturating_mul(1024 * 1024)
    }
}

/// Chunked GCC-PHAT correlation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSettings {
    #[serde(default = "default_correlation_rate")]
    pub sample_rate: u32,

    /// Chunks spread evenly between 10% and 90% of the shorter buffer.
    #[serde(default = "default_chunk_count")]
    pub chunk_count: usize,

    #[serde(default = "default_chunk_duration")]
    pub chunk_duration_secs: f64,

    /// Fewer valid chunks than this gives a zero score.
    #[serde(default = "default_min_valid_chunks")]
    pub min_valid_chunks: usize,

    /// Chunks quieter than this RMS on either side are skipped.
    #[serde(default = "default_rms_threshold")]
    pub rms_threshold: f64,

    /// Minimum normalized correlation for a chunk to count.
    #[serde(default = "default_min_chunk_correlation")]
    pub min_chunk_correlation: f64,

    /// Lag search range in milliseconds.
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_ms: f64,

    /// Delay spread (MAD) above which the score is halved.
    #[serde(default = "default_max_delay_mad_ms")]
    pub max_delay_mad_ms: f64,
}

fn default_correlation_rate() -> u32 {
    48000
}

fn default_chunk_count() -> usize {
    10
}

fn default_chunk_duration() -> f64 {
    15.0
}

fn default_min_valid_chunks() -> usize {
    6
}

fn default_rms_threshold() -> f64 {
    0.005
}

fn default_min_chunk_correlation() -> f64 {
    0.5
}

fn default_max_lag_ms() -> f64 {
    100.0
}

fn default_max_delay_mad_ms() -> f64 {
    50.0
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_correlation_rate(),
            chunk_count: default_chunk_count(),
            chunk_duration_secs: default_chunk_duration(),
            min_valid_chunks: default_min_valid_chunks(),
            rms_threshold: default_rms_threshold(),
            min_chunk_correlation: default_min_chunk_correlation(),
            max_lag_ms: default_max_lag_ms(),
            max_delay_mad_ms: default_max_delay_mad_ms(),
        }
    }
}

/// Analysis window for MFCC and landmark hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralSettings {
    #[serde(default = "default_analysis_duration")]
    pub analysis_duration_secs: f64,

    #[serde(default = "default_spectral_rate")]
    pub sample_rate: u32,
}

fn default_analysis_duration() -> f64 {
    120.0
}

fn default_spectral_rate() -> u32 {
    22050
}

impl Default for SpectralSettings {
    fn default() -> Self {
        Self {
            analysis_duration_secs: default_analysis_duration(),
            sample_rate: default_spectral_rate(),
        }
    }
}

/// Perceptual frame hashing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,

    /// Hash grid edge (16 gives 256-bit hashes).
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,

    /// Fewer hashed frames than this is treated as a failure.
    #[serde(default = "default_min_valid_frames")]
    pub min_valid_frames: usize,

    /// Alignment search range in frames, both directions.
    #[serde(default = "default_max_offset")]
    pub max_offset: usize,
}

fn default_frame_count() -> usize {
    25
}

fn default_hash_size() -> u32 {
    16
}

fn default_min_valid_frames() -> usize {
    11
}

fn default_max_offset() -> usize {
    5
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            hash_size: default_hash_size(),
            min_valid_frames: default_min_valid_frames(),
            max_offset: default_max_offset(),
        }
    }
}

/// How scene-duration sequences are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneComparison {
    /// Dynamic time warping distance.
    #[default]
    Dtw,
    /// Pearson correlation over the common prefix.
    Pearson,
}

/// Scene detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    /// Content-change threshold on a 0-100 scale.
    #[serde(default = "default_scene_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub comparison: SceneComparison,
}

fn default_scene_threshold() -> f64 {
    30.0
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            threshold: default_scene_threshold(),
            comparison: SceneComparison::default(),
        }
    }
}

/// External tool locations and per-invocation timeouts (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_fpcalc")]
    pub fpcalc: String,

    #[serde(default = "default_java")]
    pub java: String,

    /// Path to the Panako jar; empty when not installed.
    #[serde(default)]
    pub panako_jar: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_decode_timeout")]
    pub decode_timeout_secs: u64,

    #[serde(default = "default_frame_timeout")]
    pub frame_timeout_secs: u64,

    #[serde(default = "default_fingerprint_timeout")]
    pub fingerprint_timeout_secs: u64,

    #[serde(default = "default_scene_timeout")]
    pub scene_timeout_secs: u64,

    #[serde(default = "default_panako_timeout")]
    pub panako_timeout_secs: u64,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_fpcalc() -> String {
    "fpcalc".to_string()
}

fn default_java() -> String {
    "java".to_string()
}

fn default_probe_timeout() -> u64 {
    15
}

fn default_decode_timeout() -> u64 {
    60
}

fn default_frame_timeout() -> u64 {
    10
}

fn default_fingerprint_timeout() -> u64 {
    30
}

fn default_scene_timeout() -> u64 {
    600
}

fn default_panako_timeout() -> u64 {
    30
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            fpcalc: default_fpcalc(),
            java: default_java(),
            panako_jar: String::new(),
            probe_timeout_secs: default_probe_timeout(),
            decode_timeout_secs: default_decode_timeout(),
            frame_timeout_secs: default_frame_timeout(),
            fingerprint_timeout_secs: default_fingerprint_timeout(),
            scene_timeout_secs: default_scene_timeout(),
            panako_timeout_secs: default_panako_timeout(),
        }
    }
}

impl ToolSettings {
    /// Configured Panako jar, if any.
    pub fn panako_jar_path(&self) -> Option<PathBuf> {
        let jar = self.panako_jar.trim();
        (!jar.is_empty()).then(|| PathBuf::from(jar))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Matching,
    Cache,
    Correlation,
    Spectral,
    Video,
    Scene,
    Tools,
    Logging,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Matching,
        ConfigSection::Cache,
        ConfigSection::Correlation,
        ConfigSection::Spectral,
        ConfigSection::Video,
        ConfigSection::Scene,
        ConfigSection::Tools,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Matching => "matching",
            ConfigSection::Cache => "cache",
            ConfigSection::Correlation => "correlation",
            ConfigSection::Spectral => "spectral",
            ConfigSection::Video => "video",
            ConfigSection::Scene => "scene",
            ConfigSection::Tools => "tools",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section header.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Matching => "Matching run options",
            ConfigSection::Cache => "Decoded media cache",
            ConfigSection::Correlation => "Audio correlation (GCC-PHAT) tuning",
            ConfigSection::Spectral => "Analysis window for MFCC and landmark hashing",
            ConfigSection::Video => "Perceptual frame hashing",
            ConfigSection::Scene => "Scene detection",
            ConfigSection::Tools => "External tools and timeouts (seconds)",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[matching]"));
        assert!(toml.contains("[correlation]"));
        assert!(toml.contains("confidence_threshold"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[matching]\nmode = \"phash\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.matching.mode, "phash");
        assert_eq!(parsed.matching.confidence_threshold, 0.75);
        assert_eq!(parsed.correlation.chunk_count, 10);
        assert_eq!(parsed.tools.scene_timeout_secs, 600);
    }

    #[test]
    fn start_fraction_is_clamped() {
        let mut settings = Settings::default();
        assert!((settings.audio_start_fraction() - 0.15).abs() < 1e-12);

        settings.matching.analysis_start_percent = 95.0;
        assert!((settings.audio_start_fraction() - 0.9).abs() < 1e-12);
        assert!((settings.video_edge_fraction() - 0.4).abs() < 1e-12);

        settings.matching.analysis_start_percent = -3.0;
        assert_eq!(settings.audio_start_fraction(), 0.0);
    }

    #[test]
    fn empty_language_is_none() {
        let mut settings = Settings::default();
        assert_eq!(settings.language(), None);
        settings.matching.language = "jpn".to_string();
        assert_eq!(settings.language(), Some("jpn"));
    }

    #[test]
    fn scene_comparison_parses_lowercase() {
        let parsed: Settings = toml::from_str("[scene]\ncomparison = \"pearson\"").unwrap();
        assert_eq!(parsed.scene.comparison, SceneComparison::Pearson);
    }

    #[test]
    fn panako_jar_blank_is_none() {
        let mut tools = ToolSettings::default();
        assert!(tools.panako_jar_path().is_none());
        tools.panako_jar = "/opt/panako.jar".to_string();
        assert_eq!(tools.panako_jar_path(), Some(PathBuf::from("/opt/panako.jar")));
    }
}
