//! # Frame Constants and Types
//!
//! Core wire definitions shared by the encoder and decoder.
//!
//! ```text
//! offset  size  field
//!   0      2    magic        0xAA55, low byte first (55 AA)
//!   2      1    version      0x12
//!   3      1    command
//!   4      1    sequence     wraps mod 256
//!   5      4    device_id    little-endian
//!   9      2    payload_len  little-endian
//!  11      N    payload
//! 11+N     2    checksum     CRC-16/Modbus over [0, 11+N), little-endian
//! ```

use std::fmt;

use bytes::Bytes;

use super::encoder::encode_frame;
use crate::error::Result;

/// Frame start marker (transmitted as 0x55, 0xAA)
pub const FRAME_MAGIC: u16 = 0xAA55;

/// Supported protocol version
pub const FRAME_VERSION: u8 = 0x12;

/// Fixed header size: magic(2) + version(1) + command(1) + sequence(1) + device_id(4) + length(2)
pub const FRAME_HEADER_SIZE: usize = 11;

/// Trailing checksum size
pub const FRAME_CRC_SIZE: usize = 2;

/// Smallest valid frame (empty payload)
pub const FRAME_MIN_SIZE: usize = FRAME_HEADER_SIZE + FRAME_CRC_SIZE;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Offset of the little-endian payload length inside the header
pub const PAYLOAD_LEN_OFFSET: usize = 9;

/// Timestamp payload size (registration request, heartbeat)
pub const TIMESTAMP_PAYLOAD_SIZE: usize = 8;

/// Data report payload size: temperature(4) + humidity(4) + light(4) + timestamp(8)
pub const REPORT_PAYLOAD_SIZE: usize = 20;

/// Fault payload size: code(1) + timestamp(8)
pub const FAULT_PAYLOAD_SIZE: usize = 9;

/// Status payload size (registration answer, control)
pub const STATUS_PAYLOAD_SIZE: usize = 1;

/// Fault code reported when the sensor heuristic fires
pub const FAULT_CODE_SENSOR: u8 = 0x11;

/// Frame command
///
/// Values outside the known set decode as [`Command::Unknown`] so that new
/// collector commands never break parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Heartbeat,
    HeartbeatResponse,
    RegistrationRequest,
    RegistrationAnswer,
    DataReport,
    ReportAck,
    Fault,
    Control,
    Unknown(u8),
}

impl Command {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Command::Heartbeat,
            0x02 => Command::HeartbeatResponse,
            0x03 => Command::RegistrationRequest,
            0x04 => Command::RegistrationAnswer,
            0x10 => Command::DataReport,
            0x20 => Command::ReportAck,
            0x30 => Command::Fault,
            0x80 => Command::Control,
            other => Command::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Command::Heartbeat => 0x01,
            Command::HeartbeatResponse => 0x02,
            Command::RegistrationRequest => 0x03,
            Command::RegistrationAnswer => 0x04,
            Command::DataReport => 0x10,
            Command::ReportAck => 0x20,
            Command::Fault => 0x30,
            Command::Control => 0x80,
            Command::Unknown(byte) => byte,
        }
    }
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        Command::from_byte(byte)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Heartbeat => write!(f, "heartbeat"),
            Command::HeartbeatResponse => write!(f, "heartbeat-response"),
            Command::RegistrationRequest => write!(f, "registration-request"),
            Command::RegistrationAnswer => write!(f, "registration-answer"),
            Command::DataReport => write!(f, "data-report"),
            Command::ReportAck => write!(f, "report-ack"),
            Command::Fault => write!(f, "fault"),
            Command::Control => write!(f, "control"),
            Command::Unknown(byte) => write!(f, "unknown(0x{:02X})", byte),
        }
    }
}

/// Sensor data report (command 0x10)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    /// Temperature in degrees Celsius
    pub temperature: f32,

    /// Relative humidity in percent
    pub humidity: f32,

    /// Raw light sensor reading
    pub light: u32,

    /// Milliseconds since the Unix epoch (0 if the clock is unsynced)
    pub timestamp_ms: u64,
}

/// Fault notification (command 0x30)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultNotice {
    /// Fault code (0x11 = sensor fault)
    pub code: u8,

    /// Milliseconds since the Unix epoch (0 if the clock is unsynced)
    pub timestamp_ms: u64,
}

/// A complete, validated telemetry frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version
    pub version: u8,

    /// Command
    pub command: Command,

    /// Sender's sequence number
    pub sequence: u8,

    /// Originating device
    pub device_id: u32,

    /// Payload data
    pub payload: Bytes,

    /// CRC-16/Modbus over header and payload
    pub checksum: u16,
}

impl Frame {
    /// Create a new frame with its checksum computed
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds MAX_PAYLOAD_SIZE (65535 bytes)
    pub fn new(command: Command, sequence: u8, device_id: u32, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let encoded = encode_frame(command, sequence, device_id, &payload)?;
        let checksum = u16::from_le_bytes([encoded[encoded.len() - 2], encoded[encoded.len() - 1]]);

        Ok(Self {
            version: FRAME_VERSION,
            command,
            sequence,
            device_id,
            payload,
            checksum,
        })
    }

    /// Total length on the wire (header + payload + checksum)
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len() + FRAME_CRC_SIZE
    }
}
