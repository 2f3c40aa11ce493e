//! Configuration
//!
//! Endpoint, board settings and timing values, loadable from the JSON
//! application config. Keys are PascalCase; the older `SerialPort` and
//! `Baudrate` spellings are accepted too.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{Command, Timing, DEFAULT_BAUD_RATE, DEFAULT_WAIT_WINDOW_MS};

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`AppConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Parsed, but a value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where the board is attached and how fast to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfig {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    #[serde(alias = "SerialPort")]
    pub port: String,
    /// Baud rate
    #[serde(alias = "Baudrate", default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl EndpointConfig {
    /// Create an endpoint for `port` at `baud_rate`
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    /// Reject an empty port name or a zero baud rate
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial port name is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud rate must be non-zero".into()));
        }
        Ok(())
    }
}

/// Initial values for the six setting commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DaqSettings {
    /// Collection duration in milliseconds
    pub collect_duration: i32,
    /// Initial trigger threshold
    pub initial_threshold: i32,
    /// Signal polarity
    pub signal_sign: i32,
    /// Signal baseline
    pub signal_baseline: i32,
    /// Sampling time interval
    pub time_interval: i32,
    /// Amplifier gain
    pub gain: i32,
}

impl DaqSettings {
    /// Setting commands paired with their values, in the order they are applied
    pub fn commands(&self) -> [(Command, i32); 6] {
        [
            (Command::SetDuration, self.collect_duration),
            (Command::SetThreshold, self.initial_threshold),
            (Command::SetSign, self.signal_sign),
            (Command::SetBaseline, self.signal_baseline),
            (Command::SetInterval, self.time_interval),
            (Command::SetGain, self.gain),
        ]
    }

    /// Collection duration; negative values clamp to zero
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.collect_duration.max(0) as u64)
    }
}

/// Sequencer timing, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimingConfig {
    /// How long to wait for a response
    pub wait_window_ms: u64,
    /// Wait between buffer checks while collecting
    pub poll_interval_ms: u64,
    /// Pause between setting commands in a full acquisition run
    pub setting_gap_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_window_ms: DEFAULT_WAIT_WINDOW_MS,
            poll_interval_ms: DEFAULT_WAIT_WINDOW_MS,
            setting_gap_ms: 100,
        }
    }
}

impl From<TimingConfig> for Timing {
    fn from(cfg: TimingConfig) -> Self {
        Timing {
            wait_window: Duration::from_millis(cfg.wait_window_ms),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            setting_gap: Duration::from_millis(cfg.setting_gap_ms),
        }
    }
}

/// Application configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    /// Where the board is attached
    pub serial_configuration: EndpointConfig,
    /// Setting values applied before each collection
    #[serde(default)]
    pub daq_configuration: DaqSettings,
    /// Sequencer timing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Log filter directive (e.g. "info" or "daqlink_core=debug")
    #[serde(default)]
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the endpoint and timing values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serial_configuration.validate()?;
        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}
