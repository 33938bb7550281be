//! CRC-8 (polynomial `0x1D`, initial value 0) used to derive a short
//! per-device tag from an identifier string.

pub const CRC8_POLYNOMIAL: u8 = 0x1D;

/// Folds one byte into a running CRC.
pub fn crc8_step(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ CRC8_POLYNOMIAL
        } else {
            crc << 1
        };
    }
    crc
}

pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &byte| crc8_step(crc, byte))
}

/// Tag for a device identifier, computed over its UTF-8 bytes.
pub fn device_tag(id: &str) -> u8 {
    crc8(id.as_bytes())
}
