//! Receive buffer between the link reader and the frame assembler.
//!
//! One producer writes raw link bytes, one consumer decodes frames out of
//! them. Decoding works on a window over the unread bytes and only commits
//! (advances the read cursor) once a frame or a corrupt region has been
//! identified, so a half-received header stays buffered for the next scan.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::codec::{Decoded, Frame, Window};
use crate::decoder::FrameDecoder;

/// Default capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    pub used: usize,
    /// Frames decoded successfully.
    pub received: u64,
    /// Corrupt frames dropped.
    pub dropped: u64,
}

#[derive(Debug)]
struct Ring {
    data: Box<[u8]>,
    read: usize,
    write: usize,
    len: usize,
    new_data: bool,
    generation: u64,
    received: u64,
    dropped: u64,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Copy of the unread bytes in order.
    fn unread(&self) -> Vec<u8> {
        let first = self.len.min(self.capacity() - self.read);
        let mut out = Vec::with_capacity(self.len);
        out.extend_from_slice(&self.data[self.read..self.read + first]);
        out.extend_from_slice(&self.data[..self.len - first]);
        out
    }

    fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.read = (self.read + n) % self.capacity();
        self.len -= n;
    }
}

/// Fixed-capacity circular byte buffer with readiness signalling.
#[derive(Debug)]
pub struct RingBuffer {
    inner: Mutex<Ring>,
    data_ready: Condvar,
    space_ready: Condvar,
}

impl RingBuffer {
    /// A ring of [`DEFAULT_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Ring {
                data: vec![0u8; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
                len: 0,
                new_data: false,
                generation: 0,
                received: 0,
                dropped: 0,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy as much of `bytes` as fits. Never blocks; returns the count
    /// written and wakes the consumer.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut ring = self.lock();
        let cap = ring.capacity();
        let n = bytes.len().min(cap - ring.len);
        if n == 0 {
            return 0;
        }

        let write = ring.write;
        let first = n.min(cap - write);
        ring.data[write..write + first].copy_from_slice(&bytes[..first]);
        ring.data[..n - first].copy_from_slice(&bytes[first..n]);
        ring.write = (write + n) % cap;
        ring.len += n;
        ring.new_data = true;
        trace!(written = n, used = ring.len, "ring write");
        drop(ring);

        self.data_ready.notify_one();
        n
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn used_space(&self) -> usize {
        self.lock().len
    }

    pub fn free_space(&self) -> usize {
        let ring = self.lock();
        ring.capacity() - ring.len
    }

    /// Wait until new data arrives or `timeout` passes. Clears the new-data
    /// flag and returns whether any unread bytes are buffered, so a missed
    /// signal still leads to a look at the buffer.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let ring = self.lock();
        let (mut ring, _) = self
            .data_ready
            .wait_timeout_while(ring, timeout, |r| !r.new_data)
            .unwrap_or_else(PoisonError::into_inner);
        ring.new_data = false;
        ring.len > 0
    }

    /// Wait until there is free space or `timeout` passes. Returns whether
    /// space is available.
    pub fn wait_for_space(&self, timeout: Duration) -> bool {
        let ring = self.lock();
        let (ring, _) = self
            .space_ready
            .wait_timeout_while(ring, timeout, |r| r.len == r.capacity())
            .unwrap_or_else(PoisonError::into_inner);
        ring.len < ring.capacity()
    }

    /// Decode the next frame from the buffered bytes.
    ///
    /// Corrupt frames are dropped and counted, and scanning continues behind
    /// them. Returns `None` once no complete frame is buffered.
    ///
    /// Decoding runs on a copy of the unread bytes with the lock released,
    /// so the link reader can keep writing. The consumed bytes are committed
    /// afterwards unless the ring was cleared in between.
    pub fn decode_next(&self, decoder: &mut FrameDecoder) -> Option<Frame> {
        let (unread, generation) = {
            let ring = self.lock();
            (ring.unread(), ring.generation)
        };

        let mut pos = 0;
        let mut dropped = 0;
        let frame = loop {
            match decoder.decode(Window::new(&unread[pos..], &[])) {
                Decoded::Frame { frame, consumed } => {
                    pos += consumed;
                    break Some(frame);
                }
                Decoded::Corrupt { consumed, reason } => {
                    pos += consumed;
                    dropped += 1;
                    warn!(%reason, "dropping corrupt frame");
                }
                Decoded::Incomplete { discard, .. } => {
                    if discard > 0 {
                        debug!(discard, "discarding bytes outside any frame");
                    }
                    pos += discard;
                    break None;
                }
            }
        };

        let mut ring = self.lock();
        if ring.generation != generation {
            debug!("ring cleared during decode; discarding result");
            return None;
        }
        ring.advance(pos);
        ring.dropped += dropped;
        if frame.is_some() {
            ring.received += 1;
        }
        drop(ring);

        if pos > 0 {
            self.space_ready.notify_all();
        }
        frame
    }

    /// Drop everything buffered and reset the counters.
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.read = 0;
        ring.write = 0;
        ring.len = 0;
        ring.new_data = false;
        ring.generation += 1;
        ring.received = 0;
        ring.dropped = 0;
        drop(ring);
        self.space_ready.notify_all();
    }

    pub fn stats(&self) -> RingStats {
        let ring = self.lock();
        RingStats {
            capacity: ring.capacity(),
            used: ring.len,
            received: ring.received,
            dropped: ring.dropped,
        }
    }

    /// Copy out and consume up to `max` buffered bytes.
    #[cfg(test)]
    pub(crate) fn read_raw(&self, max: usize) -> Vec<u8> {
        let mut ring = self.lock();
        let n = max.min(ring.len);
        let mut out = ring.unread();
        out.truncate(n);
        ring.advance(n);
        drop(ring);
        if n > 0 {
            self.space_ready.notify_all();
        }
        out
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
