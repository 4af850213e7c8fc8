//! The raw Snappy block format.
//!
//! An encoded block stream is the varint-encoded uncompressed length
//! followed by tagged chunks: literal runs stored verbatim and
//! copies referencing up to 64 KiB of already-decoded output. Using this
//! directly saves you the framing overhead (~11 bytes plus 8 per chunk)
//! but you lose the checksums and the fallback mechanism for
//! incompressible data, and you have to carry the stream boundaries
//! yourself.

mod compress;

pub use compress::{encode, max_encoded_len, EncodeError};
pub use compress::{TAG_COPY_1, TAG_COPY_2, TAG_COPY_4, TAG_LITERAL};
pub(crate) use compress::encode_into;
