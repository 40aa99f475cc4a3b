//! # Frame Encoder
//!
//! Serializes a command and payload into a complete telemetry frame, and
//! builds the per-command payload layouts.

use bytes::BufMut;

use super::crc::crc16_modbus;
use super::frame::*;
use crate::error::{Result, TelemetryError};

/// Encode a complete frame
///
/// Writes magic, version, command, sequence, device id, payload length and
/// payload, then appends the CRC-16 of everything written so far.
///
/// # Arguments
///
/// * `command` - Frame command
/// * `sequence` - Sender sequence number for this frame
/// * `device_id` - Originating device
/// * `payload` - Payload bytes (0-65535)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Frame of exactly 11 + payload.len() + 2 bytes
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload does not fit the 16-bit length field.
///
/// # Examples
///
/// ```
/// use telemetry_link::protocol::encoder::encode_frame;
/// use telemetry_link::protocol::frame::Command;
///
/// let frame = encode_frame(Command::Heartbeat, 0, 0x0102_0304, &[0u8; 8]).unwrap();
/// assert_eq!(frame.len(), 21);
/// assert_eq!(&frame[..2], &[0x55, 0xAA]);
/// ```
pub fn encode_frame(command: Command, sequence: u8, device_id: u32, payload: &[u8]) -> Result<Vec<u8>> {
    let payload_len =
        u16::try_from(payload.len()).map_err(|_| TelemetryError::PayloadTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + FRAME_CRC_SIZE);
    frame.put_u16_le(FRAME_MAGIC);
    frame.put_u8(FRAME_VERSION);
    frame.put_u8(command.as_byte());
    frame.put_u8(sequence);
    frame.put_u32_le(device_id);
    frame.put_u16_le(payload_len);
    frame.put_slice(payload);

    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);

    Ok(frame)
}

/// Write a 64-bit value as two little-endian 32-bit words, low word first
fn put_split_u64_le<B: BufMut>(buf: &mut B, value: u64) {
    buf.put_u32_le((value & 0xFFFF_FFFF) as u32);
    buf.put_u32_le((value >> 32) as u32);
}

/// Timestamp payload for registration requests and heartbeats
pub fn encode_timestamp_payload(timestamp_ms: u64) -> [u8; TIMESTAMP_PAYLOAD_SIZE] {
    let mut payload = [0u8; TIMESTAMP_PAYLOAD_SIZE];
    put_split_u64_le(&mut &mut payload[..], timestamp_ms);
    payload
}

/// Data report payload
///
/// ```text
/// 0..4   temperature  f32 LE
/// 4..8   humidity     f32 LE
/// 8..12  light        u32 LE
/// 12..20 timestamp    low word, high word
/// ```
pub fn encode_report_payload(report: &Report) -> [u8; REPORT_PAYLOAD_SIZE] {
    let mut payload = [0u8; REPORT_PAYLOAD_SIZE];
    let mut buf = &mut payload[..];
    buf.put_f32_le(report.temperature);
    buf.put_f32_le(report.humidity);
    buf.put_u32_le(report.light);
    put_split_u64_le(&mut buf, report.timestamp_ms);
    payload
}

/// Fault notification payload: code byte followed by timestamp
pub fn encode_fault_payload(fault: &FaultNotice) -> [u8; FAULT_PAYLOAD_SIZE] {
    let mut payload = [0u8; FAULT_PAYLOAD_SIZE];
    let mut buf = &mut payload[..];
    buf.put_u8(fault.code);
    put_split_u64_le(&mut buf, fault.timestamp_ms);
    payload
}

/// Single status byte (registration answer, control)
pub fn encode_status_payload(status: bool) -> [u8; STATUS_PAYLOAD_SIZE] {
    [status as u8]
}
