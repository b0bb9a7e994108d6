//! GSM 07.10 framing for gsmux.
//!
//! Every frame on the physical link carries:
//! - an address byte with the DLCI (logical channel) and C/R bit
//! - a control byte with the frame type and P/F bit
//! - in basic mode, a 1 or 2 byte length field
//! - an 8-bit FCS (reflected CRC-8, polynomial 0x07)
//!
//! Basic mode delimits frames with 0xF9 and relies on the length field.
//! Advanced mode delimits with 0x7E and byte-stuffs reserved bytes.
//!
//! Decoding never fails on bad input: corrupt frames are reported as
//! [`Decoded::Corrupt`] and the caller resynchronizes on the next flag.

pub mod channel;
#[cfg(feature = "async")]
pub mod codec_async;
pub mod codec;
pub mod crc;
pub mod decoder;
pub mod dump;
pub mod error;
pub mod reader;
pub mod ring;
pub mod writer;

pub use channel::{
    FrameType, ADVANCED_FLAG, BASIC_FLAG, CONTROL_DLCI, CR, DEFAULT_FRAME_SIZE, EA, ESCAPE,
    MAX_CHANNELS, PF,
};
pub use codec::{
    decode, decode_advanced, decode_basic, encode_frame, Corruption, Decoded, FillPolicy, Frame,
    FrameConfig, Mode, Window,
};
#[cfg(feature = "async")]
pub use codec_async::GsmCodec;
pub use decoder::{FrameDecoder, DEFAULT_HEADER_TIMEOUT};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use ring::{RingBuffer, RingStats, DEFAULT_CAPACITY};
pub use writer::FrameWriter;
