use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AcquisitionError;

/// Default configuration file looked up next to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "daqstream.toml";

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Sensor node the service connects to
    pub id: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            id: "Test-STH".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Observer update rate in Hz
    #[serde(default = "default_update_rate")]
    pub update_rate_hz: f64,
    /// Directory sessions are persisted to
    #[serde(default = "default_measurement_dir")]
    pub measurement_dir: PathBuf,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            update_rate_hz: default_update_rate(),
            measurement_dir: default_measurement_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSettings {
    /// Messages buffered per observer before it is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound for a single send to an observer
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl BroadcastSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_update_rate() -> f64 {
    60.0
}

fn default_measurement_dir() -> PathBuf {
    PathBuf::from("measurements")
}

fn default_queue_capacity() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

impl AppConfig {
    /// Load from `daqstream.toml` and `DAQSTREAM_` environment variables
    pub fn load() -> Result<Self, AcquisitionError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Defaults, then the TOML file (if present), then the environment
    ///
    /// Nested keys are separated by `__`, e.g. `DAQSTREAM_ACQUISITION__UPDATE_RATE_HZ=30`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DAQSTREAM_").split("__"))
            .extract()
            .map_err(|e| AcquisitionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if !(self.acquisition.update_rate_hz.is_finite() && self.acquisition.update_rate_hz > 0.0) {
            return Err(AcquisitionError::Config(format!(
                "Invalid update_rate_hz {}. Must be positive",
                self.acquisition.update_rate_hz
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AcquisitionError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.broadcast.queue_capacity == 0 {
            return Err(AcquisitionError::Config(
                "broadcast queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
