//! Configuration module for ndct.
//!
//! Handles loading and parsing the .ndctrc configuration file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::probe::DEFAULT_PROBE_TIMEOUT;
use crate::connection::ssh::{DEFAULT_SSH_PORT, DEFAULT_SSH_TIMEOUT};
use crate::logging::LogConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "NDCT_CONFIG";

/// Default .ndctrc file content with all settings documented.
const DEFAULT_NDCTRC: &str = r#"# ndct Configuration File
# ========================
# Lines starting with '#' are comments.
#
# Storage
# -------
# Key file holding the encryption key. Created on first use from a
# passphrase. Back it up: encrypted data cannot be recovered without it,
# even with the original passphrase.
# key_path = ~/.ndct/key.key
#
# Directory holding the encrypted device inventory.
# db_path = ~/.ndct/db/

# Connectivity
# ------------
# Reachability probe used before connecting: icmp (system ping) or tcp
# probe = icmp
# probe_timeout = 2        # Seconds to wait for a probe reply
# ssh_port = 22
# ssh_timeout = 10         # Seconds for SSH connect and I/O

# Logging Configuration
# ---------------------
# Logs are stored in ~/.ndct/logs/ with automatic cleanup.
#
# log_enabled = true       # Enable/disable file logging (true/false)
# log_level = info         # Log level: trace, debug, info, warn, error, off
# log_retention = 24       # Hours to keep log files (default: 24)
"#;

/// Reachability probe selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeKind {
    /// ICMP echo through the system `ping`.
    #[default]
    Icmp,
    /// TCP connect to the SSH port.
    Tcp,
}

impl ProbeKind {
    /// Parses a probe kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "tcp" | "connect" | "port" => Self::Tcp,
            _ => Self::Icmp,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the encryption key file.
    pub key_path: PathBuf,
    /// Directory holding encrypted data files.
    pub db_path: PathBuf,
    /// Probe used before connecting.
    pub probe: ProbeKind,
    /// Probe timeout.
    pub probe_timeout: Duration,
    /// SSH port.
    pub ssh_port: u16,
    /// SSH connect and I/O timeout.
    pub ssh_timeout: Duration,
    /// Logging configuration.
    pub log_config: LogConfig,
    /// Path to config file.
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = Self::base_dir();
        Self {
            key_path: base.join("key.key"),
            db_path: base.join("db"),
            probe: ProbeKind::Icmp,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            ssh_port: DEFAULT_SSH_PORT,
            ssh_timeout: DEFAULT_SSH_TIMEOUT,
            log_config: LogConfig::default(),
            config_path: Self::default_config_path(),
        }
    }
}

impl Config {
    /// Returns the ndct data directory (~/.ndct).
    #[must_use]
    pub fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ndct")
    }

    /// Returns the default config file path (~/.ndctrc).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ndctrc")
    }

    /// Loads configuration from `NDCT_CONFIG` or the default path, creating
    /// the file if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if config cannot be read or created.
    pub fn load() -> io::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// # Errors
    /// Returns error if config cannot be read or created.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.parse(&content);
        Ok(config)
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_NDCTRC.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                // Remove inline comments
                let value = value.split('#').next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting.
    fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "key_path" if !value.is_empty() => {
                self.key_path = expand_home(value);
            }
            "db_path" if !value.is_empty() => {
                self.db_path = expand_home(value);
            }
            "probe" => {
                self.probe = ProbeKind::parse(value);
            }
            "probe_timeout" => {
                if let Some(secs) = parse_secs(value) {
                    self.probe_timeout = secs;
                }
            }
            "ssh_port" => {
                if let Ok(port) = value.parse::<u16>() {
                    if port > 0 {
                        self.ssh_port = port;
                    }
                }
            }
            "ssh_timeout" => {
                if let Some(secs) = parse_secs(value) {
                    self.ssh_timeout = secs;
                }
            }
            "log_level" => {
                self.log_config.level = LogConfig::parse_level(value);
            }
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled = parse_bool(value);
            }
            _ => {}
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

fn parse_secs(value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => None,
    }
}

/// Expands a leading `~` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    if value == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(value),
    }
}
