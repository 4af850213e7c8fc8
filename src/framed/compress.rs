use byteorder::{ByteOrder, LE};
use fehler::{throw, throws};
use log::trace;
use std::cmp;
use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use thiserror::Error;

use super::crc;
use super::{
    CHECKSUM_SIZE, CHUNK_HEADER_SIZE, CHUNK_TYPE_COMPRESSED_DATA, CHUNK_TYPE_UNCOMPRESSED_DATA,
    STREAM_IDENTIFIER,
};
use crate::{raw, MAX_BLOCK_SIZE};

/// Worst-case encoded size of a full block, `max_encoded_len(MAX_BLOCK_SIZE)`.
/// Pinned by a test below.
const MAX_ENCODED_BLOCK_LEN: usize = 76_490;

/// Room reserved at the front of the output buffer: the stream identifier
/// (first chunk of a stream only), one chunk header and one checksum.
const OBUF_HEADER_LEN: usize = STREAM_IDENTIFIER.len() + CHUNK_HEADER_SIZE + CHECKSUM_SIZE;

const OBUF_LEN: usize = OBUF_HEADER_LEN + MAX_ENCODED_BLOCK_LEN;

/// Returned for every operation on a [`FrameWriter`] after [`close`].
///
/// [`close`]: FrameWriter::close
#[derive(Error, Debug)]
#[error("snappy: writer is closed")]
pub struct WriterClosed;

/// A sink error held by the writer so that every subsequent call can
/// surface it again; `io::Error` itself is not clonable.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
struct LatchedError(Arc<io::Error>);

impl LatchedError {
    fn new(err: io::Error) -> Self {
        LatchedError(Arc::new(err))
    }

    fn to_io(&self) -> io::Error {
        io::Error::new(self.0.kind(), self.clone())
    }
}

enum State {
    /// The stream identifier has not been written yet.
    Fresh,
    /// At least one chunk is on the wire.
    Streaming,
    /// The sink failed; the error is re-surfaced on every call.
    Errored(LatchedError),
    /// Terminal. The framing has no end marker, so this guards the API
    /// without touching the sink.
    Closed,
}

/// Write end of a framed Snappy stream.
///
/// Each call hands at most 64 KiB of input to the block encoder and emits
/// one chunk, falling back to an uncompressed chunk when encoding shaves
/// off less than an eighth. All errors from the sink latch: once a write
/// fails, every following operation returns the same error until
/// [`reset`](Self::reset).
pub struct FrameWriter<W: Write> {
    sink: W,
    state: State,

    /// Incoming bytes waiting for a full block; `None` for unbuffered
    /// writers, otherwise capacity is exactly one block.
    ibuf: Option<Vec<u8>>,

    /// Scratch space for one framed chunk, reused across blocks.
    obuf: Vec<u8>,
}

impl<W: Write> FrameWriter<W> {
    /// Returns an unbuffered writer: every `write` call is framed and
    /// forwarded immediately, so nothing needs to be closed or flushed for
    /// the data written so far to be complete.
    ///
    /// This performs (and compresses) poorly when fed many small writes;
    /// prefer [`new_buffered`](Self::new_buffered) unless the caller
    /// already writes block-sized pieces.
    pub fn new(sink: W) -> Self {
        FrameWriter {
            sink,
            state: State::Fresh,
            ibuf: None,
            obuf: vec![0; OBUF_LEN],
        }
    }

    /// Returns a writer that collects input into full blocks before
    /// framing them. The caller must call [`close`](Self::close) (or at
    /// least [`flush`](Write::flush)) to push the final partial block.
    pub fn new_buffered(sink: W) -> Self {
        FrameWriter {
            sink,
            state: State::Fresh,
            ibuf: Some(Vec::with_capacity(MAX_BLOCK_SIZE)),
            obuf: vec![0; OBUF_LEN],
        }
    }

    /// Flushes buffered input and makes the writer refuse further use.
    ///
    /// Returns the first error the sink reported, if any. The stream
    /// itself needs no terminator, so closing writes nothing beyond the
    /// flush.
    #[throws(io::Error)]
    pub fn close(&mut self) {
        let flushed = Write::flush(self);
        if matches!(self.state, State::Errored(_) | State::Closed) {
            flushed?;
        } else {
            self.state = State::Closed;
        }
    }

    /// Discards buffered input and any latched error, and points the
    /// writer at `sink`. The result is indistinguishable from a freshly
    /// constructed writer of the same kind.
    pub fn reset(&mut self, sink: W) {
        self.sink = sink;
        self.state = State::Fresh;
        if let Some(ibuf) = &mut self.ibuf {
            ibuf.clear();
        }
    }

    /// Consumes the writer, returning the sink. Buffered input that was
    /// never flushed is discarded, so call [`close`](Self::close) first.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// The error every operation is doomed to return, if the writer is in
    /// a terminal state.
    fn pending_error(&self) -> Option<io::Error> {
        match &self.state {
            State::Errored(err) => Some(err.to_io()),
            State::Closed => Some(io::Error::new(ErrorKind::Other, WriterClosed)),
            State::Fresh | State::Streaming => None,
        }
    }

    /// Frames `p` block by block, writing each chunk to the sink. Sink
    /// errors latch into the state; the return value counts the input
    /// bytes whose chunks were fully written.
    fn write_chunks(&mut self, mut p: &[u8]) -> usize {
        let mut written = 0;
        while !p.is_empty() {
            let mut obuf_start = STREAM_IDENTIFIER.len();
            if let State::Fresh = self.state {
                self.obuf[..STREAM_IDENTIFIER.len()].copy_from_slice(&STREAM_IDENTIFIER);
                self.state = State::Streaming;
                obuf_start = 0;
            }

            let (uncompressed, rest) = p.split_at(cmp::min(p.len(), MAX_BLOCK_SIZE));
            p = rest;

            // The checksum always covers the uncompressed bytes, whichever
            // representation goes on the wire.
            let checksum = crc::masked_crc(uncompressed);

            // Encode the block, discarding the result if the improvement
            // isn't at least 12.5%.
            let encoded_len = raw::encode_into(&mut self.obuf[OBUF_HEADER_LEN..], uncompressed);
            let (chunk_type, payload_len, obuf_end) =
                if encoded_len >= uncompressed.len() - uncompressed.len() / 8 {
                    (CHUNK_TYPE_UNCOMPRESSED_DATA, uncompressed.len(), OBUF_HEADER_LEN)
                } else {
                    (CHUNK_TYPE_COMPRESSED_DATA, encoded_len, OBUF_HEADER_LEN + encoded_len)
                };
            let chunk_len = CHECKSUM_SIZE + payload_len;

            let header = &mut self.obuf[STREAM_IDENTIFIER.len()..OBUF_HEADER_LEN];
            header[0] = chunk_type;
            header[1] = chunk_len as u8;
            header[2] = (chunk_len >> 8) as u8;
            header[3] = (chunk_len >> 16) as u8;
            LE::write_u32(&mut header[4..], checksum);

            trace!(
                "chunk type {:#04x}: {} bytes in, {} on the wire",
                chunk_type,
                uncompressed.len(),
                payload_len,
            );

            if let Err(err) = self.sink.write_all(&self.obuf[obuf_start..obuf_end]) {
                self.state = State::Errored(LatchedError::new(err));
                return written;
            }
            // Uncompressed payloads are written straight from the input
            // rather than copied through the scratch buffer.
            if chunk_type == CHUNK_TYPE_UNCOMPRESSED_DATA {
                if let Err(err) = self.sink.write_all(uncompressed) {
                    self.state = State::Errored(LatchedError::new(err));
                    return written;
                }
            }
            written += uncompressed.len();
        }
        written
    }
}

impl<W: Write> Write for FrameWriter<W> {
    /// Absorbs `p`, returning how many bytes were accepted into the frame
    /// stream or the input buffer. When the sink fails midway the count of
    /// already-absorbed bytes is returned and the error is latched for the
    /// next call; `Err` is returned only when nothing was absorbed.
    #[throws(io::Error)]
    fn write(&mut self, p: &[u8]) -> usize {
        if let Some(err) = self.pending_error() {
            throw!(err);
        }

        let mut ibuf = match self.ibuf.take() {
            None => {
                let n = self.write_chunks(p);
                if n == 0 && !p.is_empty() {
                    if let State::Errored(err) = &self.state {
                        throw!(err.to_io());
                    }
                }
                return n;
            }
            Some(ibuf) => ibuf,
        };

        let mut n_ret = 0;
        let mut p = p;
        while p.len() > MAX_BLOCK_SIZE - ibuf.len() && !matches!(self.state, State::Errored(_)) {
            let n = if ibuf.is_empty() {
                // Large write, empty buffer: frame straight from p to
                // avoid the copy.
                self.write_chunks(p)
            } else {
                let n = cmp::min(MAX_BLOCK_SIZE - ibuf.len(), p.len());
                ibuf.extend_from_slice(&p[..n]);
                let _ = self.write_chunks(&ibuf);
                ibuf.clear();
                n
            };
            n_ret += n;
            p = &p[n..];
        }
        if let State::Errored(err) = &self.state {
            let err = err.to_io();
            self.ibuf = Some(ibuf);
            if n_ret == 0 {
                throw!(err);
            }
            return n_ret;
        }
        ibuf.extend_from_slice(p);
        n_ret += p.len();
        self.ibuf = Some(ibuf);
        n_ret
    }

    /// Frames whatever input is buffered as one (possibly short) chunk; a
    /// no-op on an empty buffer. The sink itself is not flushed.
    #[throws(io::Error)]
    fn flush(&mut self) {
        if let Some(err) = self.pending_error() {
            throw!(err);
        }
        if let Some(mut ibuf) = self.ibuf.take() {
            if !ibuf.is_empty() {
                let _ = self.write_chunks(&ibuf);
                ibuf.clear();
            }
            self.ibuf = Some(ibuf);
        }
        if let State::Errored(err) = &self.state {
            throw!(err.to_io());
        }
    }
}
