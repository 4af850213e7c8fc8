//! CRC-32C checksums, masked the way the framing format stores them.
//!
//! Checksumming data that contains its own checksum is problematic, so
//! stored CRCs are rotated and offset by a fixed delta first.

const MASK_DELTA: u32 = 0xa282_ead8;

/// Masked CRC-32C (Castagnoli) of `data`, as stored in a chunk header.
pub fn masked_crc(data: &[u8]) -> u32 {
    mask(crc32c::crc32c(data))
}

/// Masks a raw CRC value for storage.
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Recovers the raw CRC value from its masked form.
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}
