//! `tokio_util::codec` adapter for either wire mode.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{encode_frame, Decoded, Frame, FrameConfig};
use crate::decoder::FrameDecoder;
use crate::error::FrameError;

/// Frame codec for `FramedRead`/`FramedWrite`.
///
/// Corrupt frames are skipped, as in [`crate::FrameReader`]; oversized
/// payloads are truncated to the configured frame size on encode.
#[derive(Debug, Clone, Default)]
pub struct GsmCodec {
    decoder: FrameDecoder,
    dropped: u64,
}

impl GsmCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config),
            dropped: 0,
        }
    }

    /// Corrupt frames skipped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Decoder for GsmCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.decoder.decode(src[..].into()) {
                Decoded::Frame { frame, consumed } => {
                    src.advance(consumed);
                    return Ok(Some(frame));
                }
                Decoded::Corrupt { consumed, reason } => {
                    src.advance(consumed);
                    self.dropped += 1;
                    warn!(%reason, "dropping corrupt frame");
                }
                Decoded::Incomplete { discard, .. } => {
                    src.advance(discard);
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<Frame> for GsmCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(
            frame.dlci,
            frame.control,
            frame.payload.as_ref(),
            self.decoder.config(),
            dst,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FrameType;
    use crate::codec::Mode;

    #[test]
    fn encode_then_decode_in_buffer() {
        for mode in [Mode::Basic, Mode::Advanced] {
            let mut codec = GsmCodec::new(FrameConfig::with_mode(mode));
            let mut buf = BytesMut::new();
            let frame = Frame::new(3, FrameType::Uih.control(), &b"async"[..]);
            codec.encode(frame.clone(), &mut buf).unwrap();

            assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame));
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
        }
    }

    #[test]
    fn partial_input_waits() {
        let mut codec = GsmCodec::default();
        let mut full = BytesMut::new();
        codec
            .encode(
                Frame::new(1, FrameType::Uih.control(), &b"split"[..]),
                &mut full,
            )
            .unwrap();

        let mut buf = BytesMut::from(&full[..4]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[4..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().map(|f| f.payload),
            Some(bytes::Bytes::from_static(b"split"))
        );
    }
}
