//! The block compression algorithm.
//!
//! A single pass over the input drives a small hash table mapping 4-byte
//! windows to their most recent position. Hits become copy tags, misses
//! accumulate into literal runs, and an adaptive stride keeps the scan
//! cheap on data that refuses to compress. The table has fixed memory
//! usage and lives on the stack, so encoding a block allocates nothing.

use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use std::cmp;
use thiserror::Error;

use crate::MAX_BLOCK_SIZE;

/// Tag kind for a literal run.
pub const TAG_LITERAL: u8 = 0x00;
/// Tag kind for a 2-byte copy: 3-bit length, 11-bit offset.
pub const TAG_COPY_1: u8 = 0x01;
/// Tag kind for a 3-byte copy: 6-bit length, 16-bit offset.
pub const TAG_COPY_2: u8 = 0x02;
/// Tag kind for a 5-byte copy with a 32-bit offset. Offsets never exceed
/// 64 KiB here, so this encoder never emits it.
pub const TAG_COPY_4: u8 = 0x03;

/// How many trailing input bytes the matcher leaves untouched. Stopping
/// the scan this early keeps every 4- and 8-byte load inside the buffer
/// and leaves room for a 16-byte-register literal fast path.
const INPUT_MARGIN: usize = 16 - 1;

/// Inputs shorter than this cannot produce a copy under the margin rule
/// (one literal byte, one copy byte, then the margin), so the driver
/// stores them as a single literal without running the matcher.
const MIN_NON_LITERAL_BLOCK_SIZE: usize = 1 + 1 + INPUT_MARGIN;

const MAX_TABLE_SIZE: usize = 1 << 14;
// Masking with the full table size lets the compiler drop bounds checks;
// the shift already keeps hash values below the active table size.
const TABLE_MASK: usize = MAX_TABLE_SIZE - 1;

/// Errors when encoding a raw Snappy block stream.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("snappy: input of {0} bytes is too large to encode")]
    TooLarge(usize),
}
type Error = EncodeError; // do it this way for better docs

fn hash(u: u32, shift: u32) -> u32 {
    u.wrapping_mul(0x1e35_a7bd) >> shift
}

/// Writes a literal chunk and returns the number of bytes written.
///
/// Assumes `dst` is large enough and `1 <= lit.len() <= 65536`.
fn emit_literal(dst: &mut [u8], lit: &[u8]) -> usize {
    debug_assert!(!lit.is_empty());
    debug_assert!(lit.len() <= MAX_BLOCK_SIZE);

    let n = lit.len() - 1;
    let i = if n < 60 {
        dst[0] = (n as u8) << 2 | TAG_LITERAL;
        1
    } else if n < 1 << 8 {
        dst[0] = 60 << 2 | TAG_LITERAL;
        dst[1] = n as u8;
        2
    } else {
        dst[0] = 61 << 2 | TAG_LITERAL;
        dst[1] = n as u8;
        dst[2] = (n >> 8) as u8;
        3
    };
    dst[i..i + lit.len()].copy_from_slice(lit);
    i + lit.len()
}

/// Writes a copy chunk and returns the number of bytes written.
///
/// Assumes `dst` is large enough, `1 <= offset <= 65535` and
/// `4 <= length <= 65535`.
fn emit_copy(dst: &mut [u8], offset: usize, mut length: usize) -> usize {
    debug_assert!(offset >= 1 && offset <= 65535);
    debug_assert!(length >= 4 && length <= 65535);

    let mut i = 0;
    while length >= 68 {
        // Emit a length-64 copy, encoded as 3 bytes.
        dst[i] = 63 << 2 | TAG_COPY_2;
        dst[i + 1] = offset as u8;
        dst[i + 2] = (offset >> 8) as u8;
        i += 3;
        length -= 64;
    }
    if length > 64 {
        // Emit a length-60 copy instead of a length-64 one: the remaining
        // 4..=7 bytes then still fit a 2-byte copy, where the 1..=3 bytes
        // a length-64 emission would leave need a 3-byte one.
        dst[i] = 59 << 2 | TAG_COPY_2;
        dst[i + 1] = offset as u8;
        dst[i + 2] = (offset >> 8) as u8;
        i += 3;
        length -= 60;
    }
    if length >= 12 || offset >= 2048 {
        dst[i] = ((length - 1) as u8) << 2 | TAG_COPY_2;
        dst[i + 1] = offset as u8;
        dst[i + 2] = (offset >> 8) as u8;
        return i + 3;
    }
    dst[i] = ((offset >> 8) as u8) << 5 | ((length - 4) as u8) << 2 | TAG_COPY_1;
    dst[i + 1] = offset as u8;
    i + 2
}

/// Writes `v` as an unsigned LEB128 varint and returns the index after the
/// encoded data.
fn encode_varint64(dst: &mut [u8], mut v: u64) -> usize {
    const B: u64 = 128;
    let mut i = 0;
    while v >= B {
        dst[i] = (v | B) as u8;
        v >>= 7;
        i += 1;
    }
    dst[i] = v as u8;
    i + 1
}

/// Returns the maximum encoded length of `src_len` uncompressed bytes, or
/// `None` when the input is too large to encode at all.
///
/// The bound is `32 + n + n/6`: the trailing literal run expands by at
/// most 62/60, and the worst per-copy item is a one-byte literal followed
/// by a five-byte copy, turning 6 input bytes into 7.
pub fn max_encoded_len(src_len: usize) -> Option<usize> {
    let n = src_len as u64;
    if n > u64::from(u32::MAX) {
        return None;
    }
    let n = 32 + n + n / 6;
    if n > u64::from(u32::MAX) {
        return None;
    }
    Some(n as usize)
}

/// Encodes `src` as a raw Snappy block stream into `dst`.
///
/// `dst` is grown to the worst-case encoded size when it is too small
/// (otherwise its storage is reused) and truncated to the encoded length,
/// which is also returned.
#[throws]
pub fn encode(dst: &mut Vec<u8>, src: &[u8]) -> usize {
    let max = match max_encoded_len(src.len()) {
        Some(max) => max,
        None => throw!(EncodeError::TooLarge(src.len())),
    };
    if dst.len() < max {
        dst.resize(max, 0);
    }
    let n = encode_into(dst, src);
    dst.truncate(n);
    n
}

/// Allocation-free driver behind [`encode`], shared with the framed
/// writer. `dst` must hold at least `max_encoded_len(src.len())` bytes.
pub(crate) fn encode_into(dst: &mut [u8], mut src: &[u8]) -> usize {
    debug_assert!(max_encoded_len(src.len()).map_or(false, |max| dst.len() >= max));

    // The stream starts with the varint-encoded uncompressed length.
    let mut d = encode_varint64(dst, src.len() as u64);

    while !src.is_empty() {
        let (p, rest) = src.split_at(cmp::min(src.len(), MAX_BLOCK_SIZE));
        src = rest;
        d += if p.len() < MIN_NON_LITERAL_BLOCK_SIZE {
            emit_literal(&mut dst[d..], p)
        } else {
            encode_block(&mut dst[d..], p)
        };
    }
    d
}

/// Encodes one non-empty block into a guaranteed-large-enough `dst`,
/// returning the number of bytes written. The varint prefix is the
/// caller's business.
///
/// Assumes `MIN_NON_LITERAL_BLOCK_SIZE <= src.len() <= MAX_BLOCK_SIZE`.
fn encode_block(dst: &mut [u8], src: &[u8]) -> usize {
    debug_assert!(src.len() >= MIN_NON_LITERAL_BLOCK_SIZE);
    debug_assert!(src.len() <= MAX_BLOCK_SIZE);

    // The largest power of two in [1 << 8, 1 << 14] not exceeding the
    // input; entries are u16 source offsets, which cannot overflow since a
    // block never exceeds 64 KiB.
    let mut shift = 32 - 8u32;
    let mut table_size = 1 << 8;
    while table_size < MAX_TABLE_SIZE && table_size < src.len() {
        shift -= 1;
        table_size *= 2;
    }
    let mut table = [0u16; MAX_TABLE_SIZE];

    // The last position the matcher may look at. Everything past it is
    // swept up by the final literal.
    let s_limit = src.len() - INPUT_MARGIN;

    // The first source index whose bytes have not been emitted yet.
    let mut next_emit = 0;

    // The output must start with a literal, so the first byte can never
    // begin a copy. That also makes the zero-initialized table harmless:
    // a bogus candidate at offset 0 fails the 4-byte equality check.
    let mut s = 1;
    let mut next_hash = hash(LE::read_u32(&src[s..]), shift);

    let mut d = 0;
    'block: loop {
        // If 32 bytes pass without a match, probe only every other byte;
        // after 32 more, every third, and so on. A found match resets the
        // stride. Costs little on compressible data and lets the scan bail
        // out of JPEG-like inputs quickly.
        let mut skip = 32;

        let mut next_s = s;
        let mut candidate;
        loop {
            s = next_s;
            let bytes_between_hash_lookups = skip >> 5;
            next_s = s + bytes_between_hash_lookups;
            skip += bytes_between_hash_lookups;
            if next_s > s_limit {
                break 'block;
            }
            candidate = usize::from(table[next_hash as usize & TABLE_MASK]);
            table[next_hash as usize & TABLE_MASK] = s as u16;
            next_hash = hash(LE::read_u32(&src[next_s..]), shift);
            if LE::read_u32(&src[s..]) == LE::read_u32(&src[candidate..]) {
                break;
            }
        }

        // A 4-byte match starts at s; everything in front of it since the
        // last emission is literal.
        d += emit_literal(&mut dst[d..], &src[next_emit..s]);

        // Chain copies greedily: after each copy, retry the position right
        // behind it before falling back to the search loop above.
        loop {
            let base = s;

            // Extend the guaranteed 4-byte match as far as it goes.
            s += 4;
            let mut i = candidate + 4;
            while s < src.len() && src[i] == src[s] {
                i += 1;
                s += 1;
            }

            d += emit_copy(&mut dst[d..], base - candidate, s - base);
            next_emit = s;
            if s >= s_limit {
                break 'block;
            }

            // One 8-byte load covers the hash windows at s-1, s and s+1.
            // Seeding s-1 and s costs a little bookkeeping and buys
            // noticeably denser output on repetitive data.
            let x = LE::read_u64(&src[s - 1..]);
            let prev_hash = hash(x as u32, shift);
            table[prev_hash as usize & TABLE_MASK] = (s - 1) as u16;
            let curr_hash = hash((x >> 8) as u32, shift);
            candidate = usize::from(table[curr_hash as usize & TABLE_MASK]);
            table[curr_hash as usize & TABLE_MASK] = s as u16;
            if (x >> 8) as u32 != LE::read_u32(&src[candidate..]) {
                next_hash = hash((x >> 16) as u32, shift);
                s += 1;
                break;
            }
        }
    }

    if next_emit < src.len() {
        d += emit_literal(&mut dst[d..], &src[next_emit..]);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(src: &[u8]) -> Vec<u8> {
        let mut dst = Vec::new();
        encode(&mut dst, src).unwrap();
        dst
    }

    #[test]
    fn empty_input_is_a_bare_varint() {
        assert_eq!(enc(b""), [0x00]);
    }

    #[test]
    fn single_byte() {
        assert_eq!(enc(b"a"), [0x01, 0x00, 0x61]);
    }

    #[test]
    fn short_input_is_one_literal() {
        let src = b"0123456789abcdef";
        let mut expected = vec![0x10, 0x3c];
        expected.extend_from_slice(src);
        assert_eq!(enc(src), expected);
    }

    #[test]
    fn run_of_a_becomes_copy() {
        // One literal byte, then a length-17 copy at offset 1.
        assert_eq!(enc(&[b'a'; 18]), [0x12, 0x00, 0x61, 0x42, 0x01, 0x00]);
        // Longer runs only grow the copy length.
        assert_eq!(enc(&[b'a'; 50]), [0x32, 0x00, 0x61, 0xc2, 0x01, 0x00]);
    }

    #[test]
    fn zeros_split_into_two_blocks() {
        let src = vec![0u8; 70_000];
        let encoded = enc(&src);
        // varint 70000, then per block one literal zero and a run of
        // length-64 copies at offset 1.
        assert_eq!(&encoded[..8], &[0xf0, 0xa2, 0x04, 0x00, 0x00, 0xfe, 0x01, 0x00]);
        assert_eq!(encoded.len(), 3_289);
    }

    #[test]
    fn literal_header_forms() {
        let mut dst = [0u8; 300];

        assert_eq!(emit_literal(&mut dst, b"a"), 2);
        assert_eq!(dst[..2], [0x00, 0x61]);

        // Lengths up to 60 stay inline in the tag byte.
        assert_eq!(emit_literal(&mut dst, &[7; 60]), 61);
        assert_eq!(dst[0], 59 << 2);

        assert_eq!(emit_literal(&mut dst, &[7; 61]), 63);
        assert_eq!(dst[..2], [60 << 2, 60]);

        assert_eq!(emit_literal(&mut dst, &[7; 257]), 260);
        assert_eq!(dst[..3], [61 << 2, 0x00, 0x01]);
    }

    #[test]
    fn copy_op_selection() {
        let mut dst = [0u8; 16];

        // Short nearby copies fit two bytes.
        assert_eq!(emit_copy(&mut dst, 1, 4), 2);
        assert_eq!(dst[..2], [0x01, 0x01]);
        assert_eq!(emit_copy(&mut dst, 1, 11), 2);
        assert_eq!(dst[..2], [0x1d, 0x01]);

        // Length 12 and distant offsets need the three-byte form.
        assert_eq!(emit_copy(&mut dst, 1, 12), 3);
        assert_eq!(dst[..3], [0x2e, 0x01, 0x00]);
        assert_eq!(emit_copy(&mut dst, 2048, 4), 3);
        assert_eq!(dst[..3], [0x0e, 0x00, 0x08]);
    }

    #[test]
    fn long_copies_peel_into_pieces() {
        let mut dst = [0u8; 16];

        // 64 fits a single op.
        assert_eq!(emit_copy(&mut dst, 1, 64), 3);
        assert_eq!(dst[..3], [0xfe, 0x01, 0x00]);

        // 68 and above peel length-64 ops off the front.
        assert_eq!(emit_copy(&mut dst, 1, 68), 5);
        assert_eq!(dst[..5], [0xfe, 0x01, 0x00, 0x01, 0x01]);

        // 65..=67 peel a length-60 op so the tail stays two bytes.
        assert_eq!(emit_copy(&mut dst, 1, 67), 5);
        assert_eq!(dst[..5], [0xee, 0x01, 0x00, 0x0d, 0x01]);
    }

    #[test]
    fn varint_prefix_forms() {
        let mut dst = [0u8; 10];
        assert_eq!(encode_varint64(&mut dst, 0), 1);
        assert_eq!(dst[0], 0x00);
        assert_eq!(encode_varint64(&mut dst, 300), 2);
        assert_eq!(dst[..2], [0xac, 0x02]);
        assert_eq!(encode_varint64(&mut dst, 70_000), 3);
        assert_eq!(dst[..3], [0xf0, 0xa2, 0x04]);
    }

    #[test]
    fn worst_case_bound() {
        assert_eq!(max_encoded_len(0), Some(32));
        assert_eq!(max_encoded_len(1), Some(33));
        assert_eq!(max_encoded_len(MAX_BLOCK_SIZE), Some(76_490));
        assert_eq!(max_encoded_len(u32::MAX as usize), None);
    }
}
