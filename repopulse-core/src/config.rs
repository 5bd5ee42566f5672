//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/repopulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/repopulse/` (~/.config/repopulse/)
//! - Data: `$XDG_DATA_HOME/repopulse/` (~/.local/share/repopulse/)
//! - State/Logs: `$XDG_STATE_HOME/repopulse/` (~/.local/state/repopulse/)

use crate::cache::PollPolicy;
use crate::error::{Error, Result};
use crate::types::Granularity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Dataset cache polling behavior
    #[serde(default)]
    pub cache: CacheConfig,

    /// Where raw event records come from
    #[serde(default)]
    pub source: SourceConfig,

    /// Chart defaults
    #[serde(default)]
    pub charts: ChartsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Delay between polls of a pending dataset, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting on a pending dataset after this many seconds.
    /// Unset means consumers wait for the producer indefinitely.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: None,
        }
    }
}

impl CacheConfig {
    /// Polling policy for consumers of the dataset cache.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Event source configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SourceConfig {
    /// Override path for the SQLite event snapshot
    pub database_path: Option<PathBuf>,
}

/// Chart defaults
#[derive(Debug, Deserialize, Clone)]
pub struct ChartsConfig {
    /// Default bucket interval (D, W, M or Y)
    #[serde(default = "default_interval")]
    pub default_interval: String,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            default_interval: default_interval(),
        }
    }
}

impl ChartsConfig {
    /// Parse the configured default interval.
    pub fn granularity(&self) -> Result<Granularity> {
        self.default_interval.parse()
    }
}

fn default_interval() -> String {
    "M".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate values that serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if self.cache.poll_interval_ms == 0 {
            return Err(Error::Config(
                "cache.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.charts
            .granularity()
            .map_err(|e| Error::Config(format!("charts.default_interval: {}", e)))?;
        Ok(())
    }

    /// Returns the event snapshot path, honoring `source.database_path`.
    pub fn event_database_path(&self) -> PathBuf {
        self.source
            .database_path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/repopulse/config.toml` (~/.config/repopulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("repopulse").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite snapshot)
    ///
    /// `$XDG_DATA_HOME/repopulse/` (~/.local/share/repopulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("repopulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/repopulse/` (~/.local/state/repopulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("repopulse")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/repopulse/events.db` (~/.local/share/repopulse/events.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("events.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/repopulse/repopulse.log` (~/.local/state/repopulse/repopulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("repopulse.log")
    }
}
