//! Integrity codes for frames and messages.
//!
//! Frames carry a trailing CRC-8 (polynomial `0x07`, init `0x00`). Messages,
//! which may span several frames, carry a CRC-16 computed with the reflected
//! CCITT update used by AVR's `_crc_ccitt_update`, seeded with `0xffff`.

/// Computes the frame checksum over `data`.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, crc8_update)
}

/// Computes the message checksum over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xffff, crc_ccitt_update)
}

pub(crate) fn crc8_update(crc: u8, data: &u8) -> u8 {
    let mut c = crc ^ *data;
    for _ in 0..8 {
        c = if c & 0x80 != 0 { (c << 1) ^ 0x07 } else { c << 1 };
    }
    c
}

pub(crate) fn crc_ccitt_update(crc: u16, data: &u8) -> u16 {
    let mut d = *data as u16;
    d = d ^ lo8(crc);
    d = d ^ (d << 4);
    d = (d as u8) as u16;

    ((d << 8) | hi8(crc)) ^ (((d >> 4) as u8) as u16) ^ (d << 3)
}

pub(crate) fn lo8(x: u16) -> u16 {
    x & 0xff
}

pub(crate) fn hi8(x: u16) -> u16 {
    x >> 8
}
