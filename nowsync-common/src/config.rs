//! Configuration loading and config file resolution
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`NOWSYNC_CONFIG`)
//! 3. Platform config directory (`<config_dir>/nowsync/config.toml`)
//!
//! A missing config file is not an error: a warning is logged and compiled
//! defaults are used. A malformed file or out-of-range values are.

use crate::time::millis_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "NOWSYNC_CONFIG";

/// Default HTTP port for the engine service
pub const DEFAULT_PORT: u16 = 5790;

/// Upper bound for lyrics compensation
pub const MAX_COMPENSATION_MS: f64 = 2000.0;

/// Accepted range for `position_poll_interval_secs`
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.01;
pub const MAX_POLL_INTERVAL_SECS: f64 = 3600.0;

/// Position tracking and lyrics sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often the poller asks the position source for a sample
    pub position_poll_interval_secs: f64,

    /// Forward offset applied to lyrics-facing reads (clamped to 0..=2000)
    pub lyrics_compensation_ms: f64,

    /// Minimum position movement between two `lyrics.sync` emissions
    pub lyrics_sync_threshold_secs: f64,

    /// Number of raw samples kept for diagnostics
    pub position_history_size: usize,

    /// Upper bound on a single sample fetch
    pub source_timeout_ms: u64,

    /// Broadcast buffer size for transport subscribers
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            position_poll_interval_secs: 1.0,
            lyrics_compensation_ms: 200.0,
            lyrics_sync_threshold_secs: 0.05,
            position_history_size: 5,
            source_timeout_ms: 1000,
            event_channel_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Poll period, clamped to the accepted range so an unvalidated config
    /// cannot produce a zero or overflowing interval
    pub fn poll_interval(&self) -> Duration {
        let secs = self
            .position_poll_interval_secs
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(1))
    }

    /// Position jump that counts as a seek; never below half a second
    pub fn seek_threshold_secs(&self) -> f64 {
        (self.position_poll_interval_secs * 0.5).max(0.5)
    }

    /// How long interpolation is trusted; never below one second
    pub fn max_interpolation_secs(&self) -> f64 {
        (self.position_poll_interval_secs * 2.0).max(1.0)
    }

    pub fn source_timeout(&self) -> Duration {
        millis_to_duration(self.source_timeout_ms)
    }

    pub fn compensation_ms(&self) -> f64 {
        clamp_compensation_ms(self.lyrics_compensation_ms)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let interval = self.position_poll_interval_secs;
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&interval) {
            return Err(Error::Config(format!(
                "position_poll_interval_secs must be between {} and {}, got {}",
                MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, interval
            )));
        }
        let threshold = self.lyrics_sync_threshold_secs;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::Config(format!(
                "lyrics_sync_threshold_secs must be >= 0, got {}",
                threshold
            )));
        }
        if self.position_history_size == 0 {
            return Err(Error::Config("position_history_size must be at least 1".to_string()));
        }
        if self.source_timeout_ms == 0 {
            return Err(Error::Config("source_timeout_ms must be at least 1".to_string()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Clamp a compensation value to `0..=MAX_COMPENSATION_MS`; non-finite becomes 0
pub fn clamp_compensation_ms(compensation_ms: f64) -> f64 {
    if compensation_ms.is_finite() {
        compensation_ms.clamp(0.0, MAX_COMPENSATION_MS)
    } else {
        0.0
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Pull-based position source settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL returning `{"position": <secs>, "timestamp": <rfc3339>?}`
    pub url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: Option<String>,
}

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {:?} not found, using built-in defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Resolve the config path and load it
    ///
    /// Returns defaults when no candidate path can be determined at all.
    pub fn load_resolved(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config location available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Pick the config file path following the documented priority order
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("nowsync").join("config.toml"))
}
