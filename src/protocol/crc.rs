//! # CRC-16/Modbus Implementation
//!
//! CRC-16 checksum used to protect every telemetry frame.
//!
//! **Polynomial**: 0x8005, processed LSB-first (reflected mask 0xA001)
//! **Initial Value**: 0xFFFF
//! **Final XOR**: none
//!
//! The algorithm must match the collector byte-for-byte.

/// Reflected CRC-16 polynomial mask
const CRC16_POLY: u16 = 0xA001;

/// Initial value of the CRC register
pub const CRC16_INIT: u16 = 0xFFFF;

/// Precomputed CRC16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC-16/Modbus checksum using lookup table (fast)
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for (header + payload)
///
/// # Returns
///
/// * `u16` - Calculated checksum, transmitted little-endian on the wire
///
/// # Examples
///
/// ```
/// use telemetry_link::protocol::crc::crc16_modbus;
///
/// assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
/// assert_eq!(crc16_modbus(&[]), 0xFFFF);
/// ```
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc = (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0x00FF) as usize];
    }

    crc
}

/// Calculate CRC-16/Modbus checksum bit by bit (slow, for verification)
///
/// Straight transcription of the register algorithm: XOR the byte into the
/// low half, then eight shift-right steps, XOR-ing 0xA001 when the bit
/// shifted out was set.
#[allow(dead_code)]
fn crc16_modbus_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= byte as u16;

        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
