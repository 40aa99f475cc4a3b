//! # Error Types
//!
//! Custom error types for the telemetry link using `thiserror`.

use thiserror::Error;

use crate::protocol::decoder::DecodeError;
use crate::protocol::frame::Command;

/// Main error type for the telemetry link
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Inbound frame failed validation
    #[error("frame decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound payload does not fit the 16-bit length field
    #[error("payload of {0} bytes exceeds maximum 65535")]
    PayloadTooLarge(usize),

    /// Payload shorter than the layout its command requires
    #[error("malformed {command} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        command: Command,
        expected: usize,
        actual: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Link transport errors
    #[error("link error: {0}")]
    Link(String),

    /// None of the candidate serial devices could be opened
    #[error("no serial device found (tried: {0})")]
    LinkNotFound(String),

    /// Sensor source errors
    #[error("sensor error: {0}")]
    Sensor(String),
}

/// Result type alias for the telemetry link
pub type Result<T> = std::result::Result<T, TelemetryError>;
