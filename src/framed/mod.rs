//! The Snappy framing format.
//!
//! A framed stream is a magic identifier chunk followed by data chunks of
//! at most 64 KiB of uncompressed content each. Every data chunk carries
//! a masked CRC-32C of its uncompressed bytes, and chunks that refuse to
//! compress are stored verbatim so the ratio never goes negative.
//!
//! The format has no end marker, so streams can be concatenated back to
//! back and a writer needs no finalization on the wire.

mod compress;
pub mod crc;

/// Appears at the front of every framed Snappy stream: a chunk of type
/// 0xff whose 6-byte payload spells `sNaPpY`.
pub const STREAM_IDENTIFIER: [u8; 10] =
    [0xff, 0x06, 0x00, 0x00, 0x73, 0x4e, 0x61, 0x50, 0x70, 0x59];

/// Chunk carrying a compressed block.
pub const CHUNK_TYPE_COMPRESSED_DATA: u8 = 0x00;
/// Chunk carrying raw bytes that did not compress well enough.
pub const CHUNK_TYPE_UNCOMPRESSED_DATA: u8 = 0x01;
/// The stream identifier, seen as a chunk type.
pub const CHUNK_TYPE_STREAM_IDENTIFIER: u8 = 0xff;

/// Bytes in a chunk header: one type byte, then the payload length as a
/// 3-byte little-endian integer.
pub const CHUNK_HEADER_SIZE: usize = 4;
/// Bytes of masked CRC-32C leading every data chunk's payload.
pub const CHECKSUM_SIZE: usize = 4;

pub use compress::*;
