use bytes::{BufMut, Bytes, BytesMut};

use crate::channel::{
    FrameType, ADVANCED_FLAG, BASIC_FLAG, CR, DEFAULT_FRAME_SIZE, EA, ESCAPE, ESCAPED_BYTES,
    ESCAPE_MASK, MAX_CHANNELS,
};
use crate::crc::Crc8;
use crate::error::{FrameError, Result};

/// Padding byte used by [`FillPolicy`].
pub const FILL_BYTE: u8 = 0xAA;

/// Largest payload a basic mode length field can express (15 bits).
const MAX_BASIC_LENGTH: usize = 0x7FFF;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical channel (0 = control).
    pub dlci: u8,
    /// Control byte: frame type plus P/F bit.
    pub control: u8,
    /// Information field. Empty for SABM/UA/DM/DISC.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(dlci: u8, control: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            dlci,
            control,
            payload: payload.into(),
        }
    }

    /// Frame type, or `None` for an unknown control byte.
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_control(self.control)
    }

    /// Whether the P/F bit is set.
    pub fn poll_final(&self) -> bool {
        self.control & crate::channel::PF != 0
    }

    /// Whether this is a frame of type `t`, P/F bit ignored.
    pub fn is(&self, t: FrameType) -> bool {
        self.frame_type() == Some(t)
    }
}

/// Wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// 0xF9 delimited, length-prefixed, no byte stuffing.
    #[default]
    Basic,
    /// 0x7E delimited, byte-stuffed.
    Advanced,
}

impl Mode {
    /// The frame delimiter for this mode.
    pub fn flag(self) -> u8 {
        match self {
            Mode::Basic => BASIC_FLAG,
            Mode::Advanced => ADVANCED_FLAG,
        }
    }

    /// Operating mode number used by `AT+CMUX=<mode>`.
    pub fn cmux_value(self) -> u8 {
        match self {
            Mode::Basic => 0,
            Mode::Advanced => 1,
        }
    }
}

/// Padding appended after basic mode frames for transports that need
/// block-sized writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// No padding.
    #[default]
    Off,
    /// Always append this many fill bytes.
    Fixed(usize),
    /// Pad the frame up to a multiple of this block size.
    Align(usize),
}

impl FillPolicy {
    /// Fill bytes to append after `written` bytes.
    pub fn padding(self, written: usize) -> usize {
        match self {
            FillPolicy::Off => 0,
            FillPolicy::Fixed(n) => n,
            FillPolicy::Align(0) => 0,
            FillPolicy::Align(block) => (block - written % block) % block,
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Wire format. Default: basic.
    pub mode: Mode,
    /// Maximum payload per frame (N1). Default: 1509.
    pub max_frame_size: usize,
    /// Highest DLCI accepted from the peer in basic mode. Default: 31.
    pub max_dlci: u8,
    /// Padding after basic mode frames. Default: off.
    pub fill: FillPolicy,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Basic,
            max_frame_size: DEFAULT_FRAME_SIZE,
            max_dlci: (MAX_CHANNELS - 1) as u8,
            fill: FillPolicy::Off,
        }
    }
}

impl FrameConfig {
    /// Default configuration for `mode`.
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Encode one frame onto `dst`.
///
/// The address byte always carries EA and C/R (the host is the initiator).
/// At most `config.max_frame_size` payload bytes are taken; the number
/// taken is returned so callers can send the rest in further frames.
///
/// Basic mode wire format:
/// ```text
/// ┌──────┬─────────┬─────────┬────────────┬─────────┬─────┬──────┬──────────┐
/// │ F9   │ Address │ Control │ Length 1-2 │ Payload │ FCS │ F9   │ [fill]   │
/// └──────┴─────────┴─────────┴────────────┴─────────┴─────┴──────┴──────────┘
/// ```
/// Advanced mode drops the length field, uses 0x7E flags, and escapes
/// every byte between the flags.
pub fn encode_frame(
    dlci: u8,
    control: u8,
    payload: &[u8],
    config: &FrameConfig,
    dst: &mut BytesMut,
) -> Result<usize> {
    if dlci > 63 {
        return Err(FrameError::InvalidDlci(dlci));
    }
    let max = config.max_frame_size.min(MAX_BASIC_LENGTH);
    let payload = &payload[..payload.len().min(max)];
    let address = EA | CR | (dlci << 2);
    let covers_payload = FrameType::from_control(control) == Some(FrameType::Ui);

    match config.mode {
        Mode::Basic => {
            let start = dst.len();
            let mut header = [address, control, 0, 0];
            let header_len = if payload.len() > 127 {
                header[2] = ((payload.len() & 0x7F) << 1) as u8;
                header[3] = (payload.len() >> 7) as u8;
                4
            } else {
                header[2] = EA | ((payload.len() as u8) << 1);
                3
            };

            let mut crc = Crc8::new();
            crc.update_slice(&header[..header_len]);
            if covers_payload {
                crc.update_slice(payload);
            }

            dst.reserve(header_len + payload.len() + 3);
            dst.put_u8(BASIC_FLAG);
            dst.put_slice(&header[..header_len]);
            dst.put_slice(payload);
            dst.put_u8(crc.fcs());
            dst.put_u8(BASIC_FLAG);

            let pad = config.fill.padding(dst.len() - start);
            dst.put_bytes(FILL_BYTE, pad);
        }
        Mode::Advanced => {
            let mut crc = Crc8::new();
            crc.update(address);
            crc.update(control);
            if covers_payload {
                crc.update_slice(payload);
            }

            dst.reserve(2 * (payload.len() + 3) + 2);
            dst.put_u8(ADVANCED_FLAG);
            put_escaped(dst, &[address, control]);
            put_escaped(dst, payload);
            put_escaped(dst, &[crc.fcs()]);
            dst.put_u8(ADVANCED_FLAG);
        }
    }

    Ok(payload.len())
}

fn put_escaped(dst: &mut BytesMut, bytes: &[u8]) {
    for &b in bytes {
        if ESCAPED_BYTES.contains(&b) {
            dst.put_u8(ESCAPE);
            dst.put_u8(b ^ ESCAPE_MASK);
        } else {
            dst.put_u8(b);
        }
    }
}

/// A read-only view over buffered link bytes, possibly split in two
/// (the wrapped halves of a ring buffer).
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> Window<'a> {
    /// A window over `head` followed by `tail`.
    pub fn new(head: &'a [u8], tail: &'a [u8]) -> Self {
        Self { head, tail }
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte at `index`. Callers check `index < len()`.
    pub fn at(&self, index: usize) -> u8 {
        if index < self.head.len() {
            self.head[index]
        } else {
            self.tail[index - self.head.len()]
        }
    }

    /// Index of the first `byte` at or after `from`.
    pub fn find(&self, from: usize, byte: u8) -> Option<usize> {
        (from..self.len()).find(|&i| self.at(i) == byte)
    }

    /// Copy `len` bytes starting at `start`.
    pub fn copy_range(&self, start: usize, len: usize) -> Bytes {
        let mut out = BytesMut::with_capacity(len);
        for i in start..start + len {
            out.put_u8(self.at(i));
        }
        out.freeze()
    }
}

impl<'a> From<&'a [u8]> for Window<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes, &[])
    }
}

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Corruption {
    #[error("address names DLCI {0}, which is not configured")]
    UnknownDlci(u8),
    #[error("length field {len} exceeds maximum {max}")]
    Oversize { len: usize, max: usize },
    #[error("FCS mismatch")]
    BadFcs,
    #[error("closing flag missing")]
    MissingEndFlag,
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("frame not completed in time")]
    Timeout,
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid frame; `consumed` bytes of the window belong to it (and to
    /// any garbage before it).
    Frame { frame: Frame, consumed: usize },
    /// No complete frame yet. The first `discard` bytes are garbage and may
    /// be dropped. `started` is true once header bytes follow the opening
    /// flag.
    Incomplete { discard: usize, started: bool },
    /// A corrupt frame. Drop `consumed` bytes and decode again to
    /// resynchronize on the next flag.
    Corrupt { consumed: usize, reason: Corruption },
}

/// Decode the first frame in `window` using the configured mode.
pub fn decode(window: Window<'_>, config: &FrameConfig) -> Decoded {
    match config.mode {
        Mode::Basic => decode_basic(window, config),
        Mode::Advanced => decode_advanced(window, config),
    }
}

/// Skip to the last flag of the first run of flags. Returns
/// `(last_flag, first_header_byte)`.
fn find_opening(window: &Window<'_>, flag: u8) -> Option<(usize, usize)> {
    let start = window.find(0, flag)?;
    let mut pos = start;
    while pos < window.len() && window.at(pos) == flag {
        pos += 1;
    }
    Some((pos - 1, pos))
}

/// Decode a basic mode frame.
///
/// The closing flag is consumed with the frame. Corrupt frames consume
/// only their opening flags, so a bad length field cannot swallow the
/// frames behind it.
pub fn decode_basic(window: Window<'_>, config: &FrameConfig) -> Decoded {
    let Some((last_flag, pos)) = find_opening(&window, BASIC_FLAG) else {
        return Decoded::Incomplete {
            discard: window.len(),
            started: false,
        };
    };
    let avail = window.len() - pos;
    let incomplete = Decoded::Incomplete {
        discard: last_flag,
        started: avail > 0,
    };
    // address, control, length, fcs, flag
    if avail < 5 {
        return incomplete;
    }

    let address = window.at(pos);
    let dlci = address >> 2;
    if dlci > config.max_dlci {
        return Decoded::Corrupt {
            consumed: pos,
            reason: Corruption::UnknownDlci(dlci),
        };
    }
    let control = window.at(pos + 1);
    let len1 = window.at(pos + 2);

    let mut crc = Crc8::new();
    crc.update(address);
    crc.update(control);
    crc.update(len1);

    let mut length = (len1 >> 1) as usize;
    let mut header_len = 3;
    if len1 & EA == 0 {
        let len2 = window.at(pos + 3);
        crc.update(len2);
        length += len2 as usize * 128;
        header_len = 4;
    }

    if length > config.max_frame_size {
        return Decoded::Corrupt {
            consumed: pos,
            reason: Corruption::Oversize {
                len: length,
                max: config.max_frame_size,
            },
        };
    }

    let needed = header_len + length + 2;
    if avail < needed {
        return incomplete;
    }

    let payload_at = pos + header_len;
    if FrameType::from_control(control) == Some(FrameType::Ui) {
        for i in payload_at..payload_at + length {
            crc.update(window.at(i));
        }
    }
    if !crc.check(window.at(payload_at + length)) {
        return Decoded::Corrupt {
            consumed: pos,
            reason: Corruption::BadFcs,
        };
    }
    if window.at(payload_at + length + 1) != BASIC_FLAG {
        return Decoded::Corrupt {
            consumed: pos,
            reason: Corruption::MissingEndFlag,
        };
    }

    Decoded::Frame {
        frame: Frame {
            dlci,
            control,
            payload: window.copy_range(payload_at, length),
        },
        consumed: pos + needed,
    }
}

/// Decode an advanced mode frame.
///
/// The closing flag is left in the window: peers may use one flag to both
/// close a frame and open the next.
pub fn decode_advanced(window: Window<'_>, config: &FrameConfig) -> Decoded {
    let Some((last_flag, pos)) = find_opening(&window, ADVANCED_FLAG) else {
        return Decoded::Incomplete {
            discard: window.len(),
            started: false,
        };
    };

    // address + control + payload + fcs
    let limit = config.max_frame_size + 3;
    let mut raw = BytesMut::with_capacity(64);
    let mut escaped = false;
    for i in pos..window.len() {
        let b = window.at(i);
        if escaped {
            raw.put_u8(b ^ ESCAPE_MASK);
            escaped = false;
        } else if b == ADVANCED_FLAG {
            return finish_advanced(raw, i);
        } else if b == ESCAPE {
            escaped = true;
        } else {
            raw.put_u8(b);
        }
        if raw.len() > limit {
            return Decoded::Corrupt {
                consumed: i + 1,
                reason: Corruption::Oversize {
                    len: raw.len(),
                    max: limit,
                },
            };
        }
    }

    Decoded::Incomplete {
        discard: last_flag,
        started: pos < window.len(),
    }
}

fn finish_advanced(mut raw: BytesMut, closing_flag: usize) -> Decoded {
    if raw.len() < 3 {
        return Decoded::Corrupt {
            consumed: closing_flag,
            reason: Corruption::TooShort(raw.len()),
        };
    }

    let address = raw[0];
    let control = raw[1];
    let fcs = raw[raw.len() - 1];
    let mut crc = Crc8::new();
    crc.update(address);
    crc.update(control);
    let payload_end = raw.len() - 1;
    if FrameType::from_control(control) == Some(FrameType::Ui) {
        crc.update_slice(&raw[2..payload_end]);
    }
    if !crc.check(fcs) {
        return Decoded::Corrupt {
            consumed: closing_flag,
            reason: Corruption::BadFcs,
        };
    }

    raw.truncate(payload_end);
    let payload = raw.split_off(2).freeze();
    Decoded::Frame {
        frame: Frame {
            dlci: address >> 2,
            control,
            payload,
        },
        consumed: closing_flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PF;

    fn encode(dlci: u8, control: u8, payload: &[u8], config: &FrameConfig) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(dlci, control, payload, config, &mut buf).unwrap();
        buf
    }

    fn expect_frame(decoded: Decoded) -> (Frame, usize) {
        match decoded {
            Decoded::Frame { frame, consumed } => (frame, consumed),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn basic_hello_on_control_channel() {
        let wire = [
            0xF9, 0x03, 0xEF, 0x0B, b'H', b'E', b'L', b'L', b'O', 0x18, 0xF9,
        ];
        let (frame, consumed) = expect_frame(decode_basic(wire[..].into(), &FrameConfig::default()));
        assert_eq!(frame.dlci, 0);
        assert!(frame.is(FrameType::Uih));
        assert_eq!(frame.payload.as_ref(), b"HELLO");
        assert_eq!(consumed, wire.len());

        let encoded = encode(0, FrameType::Uih.control(), b"HELLO", &FrameConfig::default());
        assert_eq!(encoded.as_ref(), &wire);
    }

    #[test]
    fn basic_sabm_wire_bytes() {
        let encoded = encode(0, FrameType::Sabm.with_pf(), b"", &FrameConfig::default());
        assert_eq!(encoded.as_ref(), &[0xF9, 0x03, 0x3F, 0x01, 0x1C, 0xF9]);
    }

    #[test]
    fn basic_roundtrip_types_and_sizes() {
        let cfg = FrameConfig::default();
        for t in FrameType::ALL {
            for len in [0usize, 1, 127, 128, 1000, DEFAULT_FRAME_SIZE] {
                let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
                let wire = encode(5, t.control(), &payload, &cfg);
                let (frame, consumed) = expect_frame(decode_basic(wire[..].into(), &cfg));
                assert_eq!(consumed, wire.len());
                assert_eq!(frame.dlci, 5);
                assert_eq!(frame.frame_type(), Some(t));
                assert_eq!(frame.payload.as_ref(), payload.as_slice());
            }
        }
    }

    #[test]
    fn two_byte_length_field() {
        let payload = vec![0x55; 300];
        let wire = encode(1, FrameType::Uih.control(), &payload, &FrameConfig::default());
        // Low 7 bits shifted left with EA clear, then the high bits.
        assert_eq!(wire[3], ((300 & 0x7F) << 1) as u8);
        assert_eq!(wire[4], (300 >> 7) as u8);
        assert_eq!(wire.len(), 1 + 4 + 300 + 2);
    }

    #[test]
    fn payload_capped_at_frame_size() {
        let cfg = FrameConfig {
            max_frame_size: 10,
            ..FrameConfig::default()
        };
        let mut buf = BytesMut::new();
        let taken = encode_frame(2, FrameType::Uih.control(), &[1u8; 25], &cfg, &mut buf).unwrap();
        assert_eq!(taken, 10);
        let (frame, _) = expect_frame(decode_basic(buf[..].into(), &cfg));
        assert_eq!(frame.payload.len(), 10);
    }

    #[test]
    fn invalid_dlci_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(64, 0xEF, b"", &FrameConfig::default(), &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDlci(64)));
    }

    #[test]
    fn advanced_roundtrip_escapes_reserved_bytes() {
        let cfg = FrameConfig::with_mode(Mode::Advanced);
        let payload = [0x7E, 0x7D, 0x11, 0x91, 0x13, 0x93, 0x00, 0xFF, b'A'];
        let wire = encode(3, FrameType::Uih.control(), &payload, &cfg);

        assert_eq!(wire[0], ADVANCED_FLAG);
        assert_eq!(wire[wire.len() - 1], ADVANCED_FLAG);
        let inner = &wire[1..wire.len() - 1];
        assert!(!inner.contains(&ADVANCED_FLAG));
        assert!(!inner.contains(&0x11) && !inner.contains(&0x13));

        let (frame, consumed) = expect_frame(decode_advanced(wire[..].into(), &cfg));
        assert_eq!(consumed, wire.len() - 1);
        assert_eq!(frame.dlci, 3);
        assert_eq!(frame.payload.as_ref(), &payload);
    }

    #[test]
    fn advanced_roundtrip_all_types() {
        let cfg = FrameConfig::with_mode(Mode::Advanced);
        for t in FrameType::ALL {
            let wire = encode(7, t.with_pf(), b"payload", &cfg);
            let (frame, _) = expect_frame(decode_advanced(wire[..].into(), &cfg));
            assert_eq!(frame.frame_type(), Some(t));
            assert!(frame.poll_final());
            assert_eq!(frame.payload.as_ref(), b"payload");
        }
    }

    #[test]
    fn advanced_shared_flag_between_frames() {
        let cfg = FrameConfig::with_mode(Mode::Advanced);
        let first = encode(1, FrameType::Uih.control(), b"one", &cfg);
        let second = encode(2, FrameType::Uih.control(), b"two", &cfg);
        let mut wire = first.to_vec();
        wire.extend_from_slice(&second[1..]);

        let (f1, consumed) = expect_frame(decode_advanced(wire[..].into(), &cfg));
        assert_eq!(f1.payload.as_ref(), b"one");
        let rest = &wire[consumed..];
        let (f2, _) = expect_frame(decode_advanced(rest.into(), &cfg));
        assert_eq!(f2.dlci, 2);
        assert_eq!(f2.payload.as_ref(), b"two");
    }

    #[test]
    fn single_bit_flips_are_detected() {
        for mode in [Mode::Basic, Mode::Advanced] {
            let cfg = FrameConfig::with_mode(mode);
            for control in [FrameType::Uih.control(), FrameType::Ui.control()] {
                let wire = encode(1, control, b"abc", &cfg);
                // Flip every bit of the header (and the UI payload, which
                // is FCS-covered). Skip flips that touch escape sequences.
                let covered = if control == FrameType::Ui.control() {
                    wire.len() - 2
                } else {
                    3
                };
                for byte in 1..=covered {
                    if wire[byte] == ESCAPE || wire[byte - 1] == ESCAPE {
                        continue;
                    }
                    for bit in 0..8 {
                        let mut corrupted = wire.to_vec();
                        corrupted[byte] ^= 1 << bit;
                        if corrupted[byte] == mode.flag() || corrupted[byte] == ESCAPE {
                            continue;
                        }
                        let decoded = decode(corrupted[..].into(), &cfg);
                        assert!(
                            !matches!(&decoded, Decoded::Frame { frame, .. } if frame.payload.as_ref() == b"abc" && frame.control == control && frame.dlci == 1),
                            "flip at byte {byte} bit {bit} ({mode:?}) went unnoticed"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn ui_fcs_covers_payload() {
        let cfg = FrameConfig::default();
        let mut wire = encode(1, FrameType::Ui.control(), b"data", &cfg).to_vec();
        wire[5] ^= 0x01;
        assert!(matches!(
            decode_basic(wire[..].into(), &cfg),
            Decoded::Corrupt {
                reason: Corruption::BadFcs,
                ..
            }
        ));

        // The same damage in a UIH payload is not FCS-covered.
        let mut wire = encode(1, FrameType::Uih.control(), b"data", &cfg).to_vec();
        wire[5] ^= 0x01;
        assert!(matches!(decode_basic(wire[..].into(), &cfg), Decoded::Frame { .. }));
    }

    #[test]
    fn basic_incomplete_keeps_opening_flag() {
        let cfg = FrameConfig::default();
        let wire = encode(1, FrameType::Uih.control(), b"hello", &cfg);
        let mut input = vec![0x00, 0x41, 0x42];
        input.extend_from_slice(&wire[..6]);

        match decode_basic(input[..].into(), &cfg) {
            Decoded::Incomplete { discard, started } => {
                assert_eq!(discard, 3);
                assert!(started);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_only_is_discarded() {
        let input = [0x01, 0x02, 0x03];
        assert_eq!(
            decode_basic(input[..].into(), &FrameConfig::default()),
            Decoded::Incomplete {
                discard: 3,
                started: false
            }
        );
    }

    #[test]
    fn repeated_flags_are_skipped() {
        let cfg = FrameConfig::default();
        let wire = encode(2, FrameType::Ua.with_pf(), b"", &cfg);
        let mut input = vec![0xF9, 0xF9, 0xF9];
        input.extend_from_slice(&wire);
        let (frame, consumed) = expect_frame(decode_basic(input[..].into(), &cfg));
        assert_eq!(frame.dlci, 2);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn unknown_dlci_is_corrupt() {
        let cfg = FrameConfig {
            max_dlci: 2,
            ..FrameConfig::default()
        };
        let wire = encode(5, FrameType::Uih.control(), b"x", &FrameConfig::default());
        assert_eq!(
            decode_basic(wire[..].into(), &cfg),
            Decoded::Corrupt {
                consumed: 1,
                reason: Corruption::UnknownDlci(5)
            }
        );
    }

    #[test]
    fn oversize_length_is_corrupt() {
        let cfg = FrameConfig {
            max_frame_size: 64,
            ..FrameConfig::default()
        };
        let wire = encode(1, FrameType::Uih.control(), &[0u8; 100], &FrameConfig::default());
        assert!(matches!(
            decode_basic(wire[..].into(), &cfg),
            Decoded::Corrupt {
                reason: Corruption::Oversize { len: 100, max: 64 },
                ..
            }
        ));
    }

    #[test]
    fn missing_end_flag_is_corrupt() {
        let cfg = FrameConfig::default();
        let mut wire = encode(1, FrameType::Uih.control(), b"abc", &cfg).to_vec();
        let last = wire.len() - 1;
        wire[last] = 0x00;
        assert!(matches!(
            decode_basic(wire[..].into(), &cfg),
            Decoded::Corrupt {
                reason: Corruption::MissingEndFlag,
                consumed: 1
            }
        ));
    }

    #[test]
    fn corrupt_then_valid_resynchronizes() {
        let cfg = FrameConfig::default();
        let mut bad = encode(1, FrameType::Uih.control(), b"bad", &cfg).to_vec();
        let fcs_at = bad.len() - 2;
        bad[fcs_at] ^= 0xFF;
        let good = encode(2, FrameType::Uih.control(), b"good", &cfg);
        let mut input = bad;
        input.extend_from_slice(&good);

        let mut offset = 0;
        let mut frames = Vec::new();
        let mut dropped = 0;
        loop {
            match decode_basic(input[offset..].into(), &cfg) {
                Decoded::Frame { frame, consumed } => {
                    frames.push(frame);
                    offset += consumed;
                }
                Decoded::Corrupt { consumed, .. } => {
                    dropped += 1;
                    offset += consumed;
                }
                Decoded::Incomplete { .. } => break,
            }
        }
        assert_eq!(dropped, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), b"good");
    }

    #[test]
    fn advanced_too_short_is_corrupt() {
        let input = [0x7E, 0x03, 0x3F, 0x7E];
        assert!(matches!(
            decode_advanced(input[..].into(), &FrameConfig::with_mode(Mode::Advanced)),
            Decoded::Corrupt {
                reason: Corruption::TooShort(2),
                consumed: 3
            }
        ));
    }

    #[test]
    fn advanced_oversize_is_corrupt() {
        let cfg = FrameConfig {
            mode: Mode::Advanced,
            max_frame_size: 4,
            ..FrameConfig::default()
        };
        let mut input = vec![0x7E];
        input.extend_from_slice(&[0x41; 16]);
        assert!(matches!(
            decode_advanced(input[..].into(), &cfg),
            Decoded::Corrupt {
                reason: Corruption::Oversize { .. },
                ..
            }
        ));
    }

    #[test]
    fn advanced_incomplete() {
        let cfg = FrameConfig::with_mode(Mode::Advanced);
        let wire = encode(1, FrameType::Uih.control(), b"partial", &cfg);
        let cut = &wire[..wire.len() - 1];
        assert_eq!(
            decode_advanced(cut.into(), &cfg),
            Decoded::Incomplete {
                discard: 0,
                started: true
            }
        );
    }

    #[test]
    fn fill_policies() {
        let fixed = FrameConfig {
            fill: FillPolicy::Fixed(31),
            ..FrameConfig::default()
        };
        let wire = encode(1, FrameType::Uih.control(), b"abc", &fixed);
        assert_eq!(wire.len(), 1 + 3 + 3 + 2 + 31);
        assert!(wire[9..].iter().all(|&b| b == FILL_BYTE));

        let aligned = FrameConfig {
            fill: FillPolicy::Align(32),
            ..FrameConfig::default()
        };
        let wire = encode(1, FrameType::Uih.control(), b"abc", &aligned);
        assert_eq!(wire.len(), 32);

        // Fill is garbage between frames and is skipped by the decoder.
        let (frame, _) = expect_frame(decode_basic(wire[..].into(), &aligned));
        assert_eq!(frame.payload.as_ref(), b"abc");

        assert_eq!(FillPolicy::Align(8).padding(16), 0);
        assert_eq!(FillPolicy::Align(0).padding(5), 0);
    }

    #[test]
    fn advanced_mode_ignores_fill() {
        let cfg = FrameConfig {
            mode: Mode::Advanced,
            fill: FillPolicy::Fixed(31),
            ..FrameConfig::default()
        };
        let wire = encode(1, FrameType::Uih.control(), b"abc", &cfg);
        assert_eq!(wire[wire.len() - 1], ADVANCED_FLAG);
    }

    #[test]
    fn window_spans_both_halves() {
        let cfg = FrameConfig::default();
        let wire = encode(4, FrameType::Uih.control(), b"wrapped", &cfg);
        let (head, tail) = wire.split_at(5);
        let (frame, consumed) = expect_frame(decode_basic(Window::new(head, tail), &cfg));
        assert_eq!(frame.payload.as_ref(), b"wrapped");
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn frame_accessors() {
        let frame = Frame::new(1, FrameType::Disc.with_pf(), Bytes::new());
        assert!(frame.is(FrameType::Disc));
        assert!(frame.poll_final());
        assert_eq!(frame.control & !PF, FrameType::Disc.control());
        assert_eq!(Frame::new(1, 0x55, Bytes::new()).frame_type(), None);
    }
}
