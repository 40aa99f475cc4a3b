//! # Sensor Module
//!
//! Sensor collaborator consumed by the reporter.
//!
//! This module handles:
//! - The `Sensor` read interface (temperature, humidity, light, validity)
//! - The zero-value fault heuristic
//! - A fixed-value source and a JSON-file source

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::config::{SensorConfig, SensorSource};
use crate::error::{Result, TelemetryError};

/// One sample from the sensor board
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Temperature in degrees Celsius
    pub temperature: f32,

    /// Relative humidity in percent
    pub humidity: f32,

    /// Raw light reading (12-bit ADC on the reference board)
    pub light: u32,

    /// Temperature/humidity read succeeded
    pub climate_valid: bool,

    /// Light read succeeded
    pub light_valid: bool,
}

impl SensorReading {
    /// A reading where every sensor failed; values are zero
    pub fn failed() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            light: 0,
            climate_valid: false,
            light_valid: false,
        }
    }

    /// Whether this reading should raise a sensor fault
    ///
    /// Exact zeros are treated as failure: temperature and humidity both 0,
    /// or light 0. A genuine zero reading is indistinguishable from a dead
    /// sensor.
    pub fn is_fault(&self) -> bool {
        !self.climate_valid
            || !self.light_valid
            || (self.temperature == 0.0 && self.humidity == 0.0)
            || self.light == 0
    }
}

/// Sensor source
#[cfg_attr(test, mockall::automock)]
pub trait Sensor: Send {
    fn read(&mut self) -> SensorReading;
}

/// Sensor that always returns the same values
#[derive(Debug, Clone)]
pub struct FixedSensor {
    reading: SensorReading,
}

impl FixedSensor {
    pub fn new(temperature: f32, humidity: f32, light: u32) -> Self {
        Self {
            reading: SensorReading {
                temperature,
                humidity,
                light,
                climate_valid: true,
                light_valid: true,
            },
        }
    }
}

impl Sensor for FixedSensor {
    fn read(&mut self) -> SensorReading {
        self.reading
    }
}

#[derive(Debug, Deserialize)]
struct FileSample {
    temperature: Option<f32>,
    humidity: Option<f32>,
    light: Option<u32>,
}

/// Sensor backed by a JSON file rewritten by an external acquisition process
///
/// Expected content: `{"temperature": 23.5, "humidity": 55.0, "light": 1200}`.
/// Missing fields mark that sensor as invalid.
#[derive(Debug, Clone)]
pub struct JsonFileSensor {
    path: PathBuf,
}

impl JsonFileSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<SensorReading> {
        let contents = fs::read_to_string(&self.path)?;
        let sample: FileSample = serde_json::from_str(&contents)
            .map_err(|e| TelemetryError::Sensor(format!("{}: {}", self.path.display(), e)))?;

        let (temperature, humidity, climate_valid) = match (sample.temperature, sample.humidity) {
            (Some(t), Some(h)) => (t, h, true),
            _ => (0.0, 0.0, false),
        };

        Ok(SensorReading {
            temperature,
            humidity,
            light: sample.light.unwrap_or(0),
            climate_valid,
            light_valid: sample.light.is_some(),
        })
    }
}

impl Sensor for JsonFileSensor {
    fn read(&mut self) -> SensorReading {
        match self.load() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sensor read failed: {}", e);
                SensorReading::failed()
            }
        }
    }
}

/// Build the sensor source selected by the configuration
pub fn sensor_from_config(config: &SensorConfig) -> Box<dyn Sensor> {
    match config.source {
        SensorSource::Fixed => Box::new(FixedSensor::new(config.temperature, config.humidity, config.light)),
        SensorSource::File => Box::new(JsonFileSensor::new(&config.path)),
    }
}
