//! File logging for ndct.
//!
//! Each run writes a timestamped log file under ~/.ndct/logs/. Files older
//! than the retention period are removed at startup. Warnings and errors are
//! mirrored to stderr.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::Config;

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log retention period in hours.
    pub retention_hours: u32,
    /// Log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Whether file logging is enabled.
    pub enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            level: DEFAULT_LOG_LEVEL.to_string(),
            enabled: true,
        }
    }
}

impl LogConfig {
    /// Parses log level from string.
    #[must_use]
    pub fn parse_level(value: &str) -> String {
        match value.to_lowercase().as_str() {
            "trace" => "trace".to_string(),
            "debug" => "debug".to_string(),
            "info" => "info".to_string(),
            "warn" | "warning" => "warn".to_string(),
            "error" => "error".to_string(),
            "off" | "none" | "disabled" => "off".to_string(),
            _ => DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Parses retention hours from string.
    #[must_use]
    pub fn parse_retention(value: &str) -> u32 {
        value.parse().unwrap_or(DEFAULT_LOG_RETENTION_HOURS)
    }
}

/// Returns the log directory path (~/.ndct/logs/).
#[must_use]
pub fn log_directory() -> PathBuf {
    Config::base_dir().join("logs")
}

/// Returns a fresh log file path inside `log_dir`.
#[must_use]
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let now = chrono::Local::now();
    let filename = format!("ndct_{}.log", now.format("%Y-%m-%d_%H-%M-%S"));
    log_dir.join(filename)
}

/// Deletes `.log` files in `log_dir` older than the retention period.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn cleanup_old_logs(log_dir: &Path, retention_hours: u32) -> io::Result<u32> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted_count = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if let Some(age) = age {
            if age > retention && fs::remove_file(&path).is_ok() {
                deleted_count += 1;
            }
        }
    }

    Ok(deleted_count)
}

/// Initializes logging into the default log directory.
///
/// # Errors
/// Returns error if the log directory or file cannot be created.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    init_in(config, &log_directory())
}

/// Initializes logging into `log_dir`.
///
/// `RUST_LOG` overrides the configured level. Returns the log file path, or
/// `None` when file logging is disabled (stderr still receives warnings).
///
/// # Errors
/// Returns error if the log directory or file cannot be created.
pub fn init_in(config: &LogConfig, log_dir: &Path) -> io::Result<Option<PathBuf>> {
    if !config.enabled || config.level == "off" {
        let _ = tracing_subscriber::registry().with(stderr_layer()).try_init();
        return Ok(None);
    }

    fs::create_dir_all(log_dir)?;
    let deleted = cleanup_old_logs(log_dir, config.retention_hours)?;

    let log_path = log_file_path(log_dir);
    let log_file = File::create(&log_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(log_file.with_max_level(tracing::Level::TRACE))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_filter(filter);

    // A second init in the same process (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer())
        .try_init();

    tracing::info!("ndct logging initialized");
    tracing::info!("Log file: {}", log_path.display());
    tracing::info!("Log level: {}", config.level);
    if deleted > 0 {
        tracing::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(Some(log_path))
}

/// Warnings and errors to stderr, without timestamps.
fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.retention_hours, DEFAULT_LOG_RETENTION_HOURS);
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
        assert!(config.enabled);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(LogConfig::parse_level("DEBUG"), "debug");
        assert_eq!(LogConfig::parse_level("warning"), "warn");
        assert_eq!(LogConfig::parse_level("none"), "off");
        assert_eq!(LogConfig::parse_level("invalid"), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_parse_retention() {
        assert_eq!(LogConfig::parse_retention("48"), 48);
        assert_eq!(
            LogConfig::parse_retention("invalid"),
            DEFAULT_LOG_RETENTION_HOURS
        );
    }

    #[test]
    fn test_log_directory() {
        let dir = log_directory();
        assert!(dir.ends_with(".ndct/logs"));
    }

    #[test]
    fn test_cleanup_keeps_recent_and_non_log_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recent.log"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let deleted = cleanup_old_logs(dir.path(), 1).unwrap();

        assert_eq!(deleted, 0);
        assert!(dir.path().join("recent.log").exists());
    }

    #[test]
    fn test_cleanup_zero_retention_removes_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.log");
        fs::write(&path, b"x").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let deleted = cleanup_old_logs(dir.path(), 0).unwrap();

        assert_eq!(deleted, 1);
        assert!(!path.exists());
        assert_eq!(cleanup_old_logs(&dir.path().join("missing"), 0).unwrap(), 0);
    }

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("/tmp/logs"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ndct_"));
        assert!(name.ends_with(".log"));
    }
}
