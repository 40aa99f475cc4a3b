//! # Telemetry Wire Protocol
//!
//! Binary frame format exchanged between a sensor node and its collector.
//!
//! This module handles:
//! - CRC-16/Modbus checksum calculation
//! - Frame encoding (header, payload, checksum)
//! - Frame decoding with ordered validation
//! - Per-command payload layouts (timestamp, report, fault, status)

pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod reader;

pub use decoder::{decode_frame, DecodeError};
pub use encoder::encode_frame;
pub use frame::{Command, FaultNotice, Frame, Report};
