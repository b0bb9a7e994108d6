use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::dump::trace_dump;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Each frame is encoded into one buffer and written in full before the
/// call returns, so frames never interleave when the writer is shared
/// behind a mutex.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.send(frame.dlci, frame.control, frame.payload.as_ref())
    }

    /// Encode and send one frame. Returns the number of payload bytes
    /// carried, which is capped at the configured frame size.
    pub fn send(&mut self, dlci: u8, control: u8, payload: &[u8]) -> Result<usize> {
        self.buf.clear();
        let taken = encode_frame(dlci, control, payload, &self.config, &mut self.buf)?;
        let buf = std::mem::take(&mut self.buf);
        let result = self.write_all_bytes(&buf);
        self.buf = buf;
        result.map(|()| taken)
    }

    /// Send raw bytes outside any frame (AT commands before muxing starts).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all_bytes(bytes)
    }

    fn write_all_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        trace_dump(">s ", bytes);
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Replace the codec configuration for subsequent frames.
    pub fn set_config(&mut self, config: FrameConfig) {
        self.config = config;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::channel::FrameType;
    use crate::codec::{decode, Decoded, FillPolicy, Mode};

    fn decode_one(wire: &[u8], config: &FrameConfig) -> Frame {
        match decode(wire.into(), config) {
            Decoded::Frame { frame, .. } => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let taken = writer.send(1, FrameType::Uih.control(), b"hello").unwrap();
        assert_eq!(taken, 5);

        let wire = writer.into_inner().into_inner();
        let frame = decode_one(&wire, &FrameConfig::default());
        assert_eq!(frame.dlci, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn advanced_mode_frames() {
        let cfg = FrameConfig::with_mode(Mode::Advanced);
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg.clone());
        let frame = Frame::new(2, FrameType::Uih.control(), &b"\x7e\x7d"[..]);
        writer.write_frame(&frame).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(decode_one(&wire, &cfg), frame);
    }

    #[test]
    fn oversized_payload_is_truncated_to_frame_size() {
        let cfg = FrameConfig {
            max_frame_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg.clone());
        let taken = writer.send(1, FrameType::Uih.control(), b"oversized").unwrap();
        assert_eq!(taken, 4);

        let wire = writer.into_inner().into_inner();
        assert_eq!(decode_one(&wire, &cfg).payload.as_ref(), b"over");
    }

    #[test]
    fn fill_bytes_written_after_frame() {
        let cfg = FrameConfig {
            fill: FillPolicy::Fixed(31),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        writer.send(0, FrameType::Sabm.with_pf(), b"").unwrap();
        assert_eq!(writer.into_inner().into_inner().len(), 6 + 31);
    }

    #[test]
    fn raw_bytes_pass_through() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_raw(b"AT\r\n").unwrap();
        assert_eq!(writer.into_inner().into_inner(), b"AT\r\n");
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(1, FrameType::Uih.control(), b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        let mut writer = FrameWriter::new(FlakyWriter::default());
        writer.send(5, FrameType::Uih.control(), b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_one(&inner.data, &FrameConfig::default()).dlci, 5);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(1, FrameType::Uih.control(), b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_io_error() {
        let mut writer = FrameWriter::new(BrokenWriter);
        let err = writer.write_raw(b"AT\r").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn accessors_and_config() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let _ = writer.get_ref();
        let _ = writer.get_mut();
        writer.set_config(FrameConfig::with_mode(Mode::Advanced));
        assert_eq!(writer.config().mode, Mode::Advanced);
        let _inner = writer.into_inner();
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails once with Interrupted, once with WouldBlock, then accepts at
    /// most 3 bytes per call.
    #[derive(Default)]
    struct FlakyWriter {
        calls: usize,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 => Err(ErrorKind::Interrupted.into()),
                2 => Err(ErrorKind::WouldBlock.into()),
                _ => {
                    let n = buf.len().min(3);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
