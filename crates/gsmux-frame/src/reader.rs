use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::codec::{Decoded, Frame, FrameConfig};
use crate::decoder::FrameDecoder;
use crate::dump::trace_dump;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads and resynchronization internally: corrupt frames
/// are counted in [`FrameReader::dropped`] and skipped, callers only see
/// valid frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    dropped: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config),
            dropped: 0,
        }
    }

    /// Read the next valid frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached,
    /// including EOF in the middle of a frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.next_buffered() {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            trace_dump("<s ", &chunk[..read]);
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn next_buffered(&mut self) -> Option<Frame> {
        loop {
            match self.decoder.decode(self.buf[..].into()) {
                Decoded::Frame { frame, consumed } => {
                    self.buf.advance(consumed);
                    return Some(frame);
                }
                Decoded::Corrupt { consumed, reason } => {
                    self.buf.advance(consumed);
                    self.dropped += 1;
                    warn!(%reason, "dropping corrupt frame");
                }
                Decoded::Incomplete { discard, .. } => {
                    self.buf.advance(discard);
                    return None;
                }
            }
        }
    }

    /// Corrupt frames skipped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        self.decoder.config()
    }
}
