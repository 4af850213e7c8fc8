//! A pure-Rust Snappy *encoder*.
//!
//! Snappy trades compression ratio for very high throughput. This crate
//! produces output that is bit-compatible with the reference
//! implementation, so any conforming decoder (including the ones embedded
//! in storage engines and RPC systems) accepts it.
//!
//! Two layers are provided:
//!
//! * [`raw`] — the block format: a varint length prefix followed by
//!   literal and copy tags. Use this when you store the compressed size
//!   out of band and want minimal overhead.
//! * [`framed`] — the framing format: a chunked stream with a magic
//!   header and per-chunk masked CRC-32C checksums, written through any
//!   [`std::io::Write`] sink. This is the format produced by the usual
//!   `.sz` tooling and is what you want for streams and files.
//!
//! Decoding is out of scope for this crate.

#![forbid(unsafe_code)]

pub mod framed;
pub mod raw;

/// The maximum number of uncompressed bytes in a block: both the unit the
/// block encoder scans for matches at a time and the largest chunk payload
/// the framing format allows.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;
