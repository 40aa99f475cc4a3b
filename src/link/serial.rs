//! # Serial Connector
//!
//! Opens the collector link over a USB/UART serial port.
//!
//! This module handles:
//! - Trying a list of device paths in order
//! - Configuring the port as 8N1 without flow control
//! - Splitting the port into read and write halves for the link driver

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::{Connector, LinkIo};
use crate::error::{Result, TelemetryError};

/// Default serial baud rate for the collector link
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Serial port connector
///
/// Each `connect` re-scans the configured paths, so a device that
/// re-enumerates under another path is picked up on reconnect.
pub struct SerialConnector {
    paths: Vec<String>,
    baud_rate: u32,
    /// Path opened by the most recent successful connect
    device_path: Option<String>,
}

impl std::fmt::Debug for SerialConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnector")
            .field("paths", &self.paths)
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

impl SerialConnector {
    /// Create a connector over the given device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., `["/dev/ttyACM0"]`)
    /// * `baud_rate` - Line speed
    pub fn new(paths: Vec<String>, baud_rate: u32) -> Self {
        Self {
            paths,
            baud_rate,
            device_path: None,
        }
    }

    /// Connector over the default paths at the default baud rate
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_DEVICE_PATHS.iter().map(|p| p.to_string()).collect(),
            DEFAULT_BAUD_RATE,
        )
    }

    /// Path of the port opened by the last successful connect
    pub fn device_path(&self) -> Option<&str> {
        self.device_path.as_deref()
    }

    /// Open the first path that succeeds
    ///
    /// # Errors
    ///
    /// Returns `LinkNotFound` listing every path tried if none opens
    fn open_first(&mut self) -> Result<tokio_serial::SerialStream> {
        for path in &self.paths {
            debug!("Trying to open serial port: {}", path);

            match open_port(path, self.baud_rate) {
                Ok(port) => {
                    info!("Opened serial link at {} ({} baud)", path, self.baud_rate);
                    self.device_path = Some(path.clone());
                    return Ok(port);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(TelemetryError::LinkNotFound(self.paths.join(", ")))
    }
}

/// Open a specific serial port as 8N1, no flow control
fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| TelemetryError::Link(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&mut self) -> Result<LinkIo> {
        let port = self.open_first()?;
        let (reader, writer) = tokio::io::split(port);
        Ok(LinkIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        match &self.device_path {
            Some(path) => format!("serial://{}", path),
            None => format!("serial://[{}]", self.paths.join(", ")),
        }
    }
}
