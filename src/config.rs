//! Station configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/station.toml` (or a file given on the command line)
//! 2. Environment variables prefixed with `WEATHER_STATION_`, nested keys
//!    separated by `__` (e.g. `WEATHER_STATION_UPLOAD__HOST=10.0.0.5`)
//!
//! Every section has defaults matching the deployed firmware, so a file only
//! needs the values that differ.
//!
//! # Example
//! ```no_run
//! use weather_station::config::StationConfig;
//!
//! let config = StationConfig::load()?;
//! config.validate()?;
//! println!("Uploading to {}:{}", config.upload.host, config.upload.port);
//! # Ok::<(), weather_station::error::StationError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::LocalZone;
use crate::error::{AppResult, StationError};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/station.toml";

/// Top-level station configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station-wide settings
    #[serde(default)]
    pub station: StationSettings,
    /// Local journal settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Uplink settings
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Station-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    /// Station name, used in log output
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
    /// Local time zone as minutes east of UTC
    pub utc_offset_minutes: i32,
    /// Seconds between acquisition ticks
    pub sample_interval_secs: u64,
}

/// Local journal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the day logs
    pub log_dir: PathBuf,
    /// Capacity of the acquisition → writer channel
    pub channel_capacity: usize,
}

/// Uplink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// InfluxDB organisation
    pub org: String,
    /// InfluxDB bucket
    pub bucket: String,
    /// API token
    pub token: String,
    /// Value of the `location` tag
    pub location: String,
    /// Status code that means the write was accepted
    pub success_status: u16,
    /// Retries after a transport failure
    pub max_retries: u32,
    /// Pause before each retry, in milliseconds
    pub retry_delay_ms: u64,
    /// Per-request timeout, in milliseconds
    pub request_timeout_ms: u64,
    /// Capacity of the network channel shared by live and replayed readings
    pub channel_capacity: usize,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            name: "weather-station".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            utc_offset_minutes: -4 * 60,
            sample_interval_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data"),
            channel_capacity: 8,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.2".to_string(),
            port: 8086,
            org: "weather-station-group".to_string(),
            bucket: "weather-records".to_string(),
            token: String::new(),
            location: crate::network::protocol::DEFAULT_LOCATION.to_string(),
            success_status: 204,
            max_retries: 3,
            retry_delay_ms: 4000,
            request_timeout_ms: 10_000,
            channel_capacity: 8,
        }
    }
}

impl StationConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("WEATHER_STATION_").split("__"))
            .extract()
            .map_err(StationError::from)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.station.log_level.to_lowercase().as_str()) {
            return Err(StationError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.station.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.station.log_format.as_str()) {
            return Err(StationError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.station.log_format,
                valid_formats.join(", ")
            )));
        }

        self.zone()?;

        if self.station.sample_interval_secs == 0 {
            return Err(StationError::Configuration(
                "sample_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.storage.channel_capacity == 0 || self.upload.channel_capacity == 0 {
            return Err(StationError::Configuration(
                "channel capacities must be greater than zero".to_string(),
            ));
        }

        if self.upload.host.is_empty() {
            return Err(StationError::Configuration(
                "upload.host must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The station's local time zone.
    pub fn zone(&self) -> AppResult<LocalZone> {
        LocalZone::from_offset_minutes(self.station.utc_offset_minutes).ok_or_else(|| {
            StationError::Configuration(format!(
                "Invalid utc_offset_minutes {}. Must be within ±1439",
                self.station.utc_offset_minutes
            ))
        })
    }

    /// Interval between acquisition ticks.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.station.sample_interval_secs)
    }
}
