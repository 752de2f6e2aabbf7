//! Logging setup on top of the `tracing` ecosystem.
//!
//! The library itself only emits `tracing` events (matcher diagnostics at
//! debug, run milestones at info, tool failures at warn). Hosts pick a
//! subscriber with one of the init functions below.
//!
//! # Example
//!
//! ```no_run
//! use vem_core::logging::{init_tracing_with_file, LogLevel};
//!
//! // Keep the guard alive for as long as logs should be flushed
//! let _guard = init_tracing_with_file(LogLevel::Debug, ".logs");
//! tracing::info!("Matching started");
//! ```

mod types;

use std::path::Path;

pub use types::LogLevel;

use crate::config::LoggingSettings;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name prefix; the appender adds a date suffix.
const LOG_FILE_PREFIX: &str = "vem.log";

/// Initialize the global subscriber writing to stderr.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Returns false if a
/// subscriber was already installed.
pub fn init_tracing(default_level: LogLevel) -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(env_filter(default_level))
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the level from the `[logging]` section.
pub fn init_tracing_from_settings(settings: &LoggingSettings) -> bool {
    init_tracing(settings.level)
}

/// Initialize the global subscriber writing to stderr and a daily log file
/// in `log_dir`.
///
/// The returned guard flushes the file writer on drop.
pub fn init_tracing_with_file(default_level: LogLevel, log_dir: impl AsRef<Path>) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir.as_ref(), LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(env_filter(default_level))
        .try_init()
        .is_ok();
    if !installed {
        tracing::warn!("Tracing subscriber already installed, file logging disabled");
    }

    guard
}

/// Initialize tracing for tests (only logs warnings and above).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_falls_back_to_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(
                env_filter(LogLevel::Warn).max_level_hint(),
                Some(tracing_subscriber::filter::LevelFilter::WARN)
            );
        }
    }

    #[test]
    fn test_tracing_can_be_initialized_twice() {
        init_test_tracing();
        init_test_tracing();
    }
}
