//! # Frame Decoder
//!
//! Validates a received buffer and turns it into a [`Frame`], and parses the
//! per-command payload layouts.
//!
//! Validation order is fixed; the first failing check decides the error:
//!
//! 1. at least 13 bytes          -> `TooShort`
//! 2. magic == 0xAA55            -> `BadMagic`
//! 3. payload_len + 13 == len    -> `LengthMismatch`
//! 4. version == 0x12            -> `BadVersion`
//! 5. CRC-16 of [0, len - 2)     -> `ChecksumMismatch`

use bytes::Bytes;
use thiserror::Error;

use super::crc::crc16_modbus;
use super::frame::*;
use super::reader::FrameReader;
use crate::error::{Result, TelemetryError};

/// Reasons a received buffer is rejected
///
/// None of these are fatal: the buffer is dropped and session state is left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: {len} bytes (minimum 13)")]
    TooShort { len: usize },

    #[error("invalid frame magic: 0x{0:04X}")]
    BadMagic(u16),

    #[error("length mismatch: header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: u16, actual: usize },

    #[error("unsupported frame version: 0x{0:02X}")]
    BadVersion(u8),

    #[error("CRC mismatch: calculated 0x{expected:04X}, received 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}

/// Decode and validate a complete frame
///
/// # Arguments
///
/// * `buf` - One complete frame as delivered by the link
///
/// # Returns
///
/// * `Result<Frame, DecodeError>` - Decoded frame, or the first failed check
///
/// An unrecognized command byte is not an error; it decodes as
/// [`Command::Unknown`].
pub fn decode_frame(buf: &[u8]) -> std::result::Result<Frame, DecodeError> {
    let too_short = || DecodeError::TooShort { len: buf.len() };

    if buf.len() < FRAME_MIN_SIZE {
        return Err(too_short());
    }

    let mut reader = FrameReader::new(buf);

    let magic = reader.read_u16_le().ok_or_else(too_short)?;
    if magic != FRAME_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let version = reader.read_u8().ok_or_else(too_short)?;
    let command = reader.read_u8().ok_or_else(too_short)?;
    let sequence = reader.read_u8().ok_or_else(too_short)?;
    let device_id = reader.read_u32_le().ok_or_else(too_short)?;
    let declared = reader.read_u16_le().ok_or_else(too_short)?;

    let actual = buf.len() - FRAME_MIN_SIZE;
    if declared as usize != actual {
        return Err(DecodeError::LengthMismatch { declared, actual });
    }

    if version != FRAME_VERSION {
        return Err(DecodeError::BadVersion(version));
    }

    let payload = reader.read_bytes(declared as usize).ok_or_else(too_short)?;
    let received_crc = reader.read_u16_le().ok_or_else(too_short)?;

    let (body, _) = buf.split_at(buf.len() - FRAME_CRC_SIZE);
    let calculated_crc = crc16_modbus(body);
    if calculated_crc != received_crc {
        return Err(DecodeError::ChecksumMismatch {
            expected: calculated_crc,
            actual: received_crc,
        });
    }

    Ok(Frame {
        version,
        command: Command::from_byte(command),
        sequence,
        device_id,
        payload: Bytes::copy_from_slice(payload),
        checksum: received_crc,
    })
}

fn malformed(command: Command, expected: usize, payload: &[u8]) -> TelemetryError {
    TelemetryError::MalformedPayload {
        command,
        expected,
        actual: payload.len(),
    }
}

/// Decode the single status byte of a registration answer or control frame
///
/// Any nonzero value means accepted / on.
pub fn decode_status_payload(command: Command, payload: &[u8]) -> Result<bool> {
    FrameReader::new(payload)
        .read_u8()
        .map(|status| status != 0)
        .ok_or_else(|| malformed(command, STATUS_PAYLOAD_SIZE, payload))
}

/// Decode the timestamp carried by registration requests and heartbeats
pub fn decode_timestamp_payload(command: Command, payload: &[u8]) -> Result<u64> {
    FrameReader::new(payload)
        .read_split_u64_le()
        .ok_or_else(|| malformed(command, TIMESTAMP_PAYLOAD_SIZE, payload))
}

/// Decode a data report payload
pub fn decode_report_payload(payload: &[u8]) -> Result<Report> {
    read_report(&mut FrameReader::new(payload))
        .ok_or_else(|| malformed(Command::DataReport, REPORT_PAYLOAD_SIZE, payload))
}

fn read_report(reader: &mut FrameReader<'_>) -> Option<Report> {
    Some(Report {
        temperature: reader.read_f32_le()?,
        humidity: reader.read_f32_le()?,
        light: reader.read_u32_le()?,
        timestamp_ms: reader.read_split_u64_le()?,
    })
}

/// Decode a fault notification payload
pub fn decode_fault_payload(payload: &[u8]) -> Result<FaultNotice> {
    read_fault(&mut FrameReader::new(payload))
        .ok_or_else(|| malformed(Command::Fault, FAULT_PAYLOAD_SIZE, payload))
}

fn read_fault(reader: &mut FrameReader<'_>) -> Option<FaultNotice> {
    Some(FaultNotice {
        code: reader.read_u8()?,
        timestamp_ms: reader.read_split_u64_le()?,
    })
}
