//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub link: LinkConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device identity
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub id: u32,
}

/// Which link transport to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Serial,
}

/// Link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_serial_ports")]
    pub serial_ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

/// Reporting schedule
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_register_every_ticks")]
    pub register_every_ticks: u64,

    #[serde(default = "default_heartbeat_every_ticks")]
    pub heartbeat_every_ticks: u64,

    #[serde(default = "default_report_every_ticks")]
    pub report_every_ticks: u64,
}

/// Where sensor readings come from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    Fixed,
    File,
}

/// Sensor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_source")]
    pub source: SensorSource,

    #[serde(default)]
    pub path: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_humidity")]
    pub humidity: f32,

    #[serde(default = "default_light")]
    pub light: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty disables file logging
    #[serde(default)]
    pub dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            register_every_ticks: default_register_every_ticks(),
            heartbeat_every_ticks: default_heartbeat_every_ticks(),
            report_every_ticks: default_report_every_ticks(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: default_sensor_source(),
            path: String::new(),
            temperature: default_temperature(),
            humidity: default_humidity(),
            light: default_light(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}

// Default value functions
fn default_device_id() -> u32 { 0x0102_0304 }

fn default_transport() -> TransportKind { TransportKind::Tcp }
fn default_address() -> String { "192.168.80.181:8765".to_string() }
fn default_serial_ports() -> Vec<String> { vec!["/dev/ttyACM0".to_string(), "/dev/ttyUSB0".to_string()] }
fn default_baud_rate() -> u32 { 115200 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_reconnect_interval_ms() -> u64 { 2000 }
fn default_outbound_queue() -> usize { 32 }

fn default_tick_interval_ms() -> u64 { 1000 }
fn default_register_every_ticks() -> u64 { 3 }
fn default_heartbeat_every_ticks() -> u64 { 10 }
fn default_report_every_ticks() -> u64 { 3 }

fn default_sensor_source() -> SensorSource { SensorSource::Fixed }
fn default_temperature() -> f32 { 23.5 }
fn default_humidity() -> f32 { 55.0 }
fn default_light() -> u32 { 1200 }

fn default_log_level() -> String { "info".to_string() }

const VALID_BAUD_RATES: [u32; 8] = [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        match self.link.transport {
            TransportKind::Tcp => {
                if self.link.address.is_empty() {
                    return Err(invalid("link address cannot be empty for tcp transport"));
                }
            }
            TransportKind::Serial => {
                if self.link.serial_ports.is_empty() {
                    return Err(invalid("serial_ports cannot be empty for serial transport"));
                }
                if !VALID_BAUD_RATES.contains(&self.link.baud_rate) {
                    return Err(invalid(format!(
                        "baud_rate must be one of: {:?}",
                        VALID_BAUD_RATES
                    )));
                }
            }
        }

        for (name, value) in [
            ("connect_timeout_ms", self.link.connect_timeout_ms),
            ("reconnect_interval_ms", self.link.reconnect_interval_ms),
            ("tick_interval_ms", self.report.tick_interval_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if self.link.outbound_queue == 0 {
            return Err(invalid("outbound_queue must be greater than 0"));
        }

        for (name, value) in [
            ("register_every_ticks", self.report.register_every_ticks),
            ("heartbeat_every_ticks", self.report.heartbeat_every_ticks),
            ("report_every_ticks", self.report.report_every_ticks),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        if self.sensor.source == SensorSource::File && self.sensor.path.is_empty() {
            return Err(invalid("sensor path cannot be empty when source = \"file\""));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
