//! Configuration management for the matching engine.
//!
//! This module provides:
//! - TOML-based configuration with one section per concern
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every missing key
//!
//! # Example
//!
//! ```no_run
//! use vem_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/vem.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Mode: {}", config.settings().matching.mode);
//!
//! config.settings_mut().matching.confidence_threshold = 0.8;
//! config.update_section(ConfigSection::Matching).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    CacheSettings, ConfigSection, CorrelationSettings, LoggingSettings, MatchingSettings,
    SceneComparison, SceneSettings, Settings, SpectralSettings, ToolSettings, VideoSettings,
};
