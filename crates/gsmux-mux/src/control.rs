//! Control channel (DLCI 0) command messages.
//!
//! Each UIH frame on DLCI 0 carries one message: a type field (EA
//! terminated, C/R bit set on commands), an EA-terminated length, and the
//! value bytes.

use bytes::{BufMut, Bytes, BytesMut};
use gsmux_frame::{CR, EA};
use tracing::{debug, error, info};

/// Parameter negotiation.
pub const CONTROL_PN: u8 = 0x81;
/// Power saving control.
pub const CONTROL_PSC: u8 = 0x41;
/// Multiplexer close down.
pub const CONTROL_CLD: u8 = 0xC1;
/// Test command.
pub const CONTROL_TEST: u8 = 0x21;
/// Modem status command.
pub const CONTROL_MSC: u8 = 0xE1;
/// Non-supported command response.
pub const CONTROL_NSC: u8 = 0x11;
/// Remote port negotiation.
pub const CONTROL_RPN: u8 = 0x91;
/// Remote line status.
pub const CONTROL_RLS: u8 = 0x51;
/// Service negotiation.
pub const CONTROL_SNC: u8 = 0xD1;

/// V.24 flow control: "no frames allowed".
pub const SIGNAL_FC: u8 = 0x02;
/// Ready to communicate (DSR/DTR).
pub const SIGNAL_RTC: u8 = 0x04;
/// Ready to receive (RTS/CTS).
pub const SIGNAL_RTR: u8 = 0x08;
/// Incoming call indicator (RI).
pub const SIGNAL_IC: u8 = 0x40;
/// Data valid (DCD).
pub const SIGNAL_DV: u8 = 0x80;

/// Signals the host advertises for every open channel.
pub const HOST_SIGNALS: u8 = SIGNAL_DV | SIGNAL_RTR | SIGNAL_RTC | EA;

/// Payload of the keep-alive TEST command.
pub const PING_PATTERN: &[u8] = b"PING\r\n";

/// Longest length field accepted, in bytes.
const MAX_LENGTH_OCTETS: usize = 4;

/// Known control command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Pn,
    Psc,
    Cld,
    Test,
    Msc,
    Nsc,
    Rpn,
    Rls,
    Snc,
}

impl CommandType {
    /// Type byte with EA set and C/R clear.
    pub const fn code(self) -> u8 {
        match self {
            CommandType::Pn => CONTROL_PN,
            CommandType::Psc => CONTROL_PSC,
            CommandType::Cld => CONTROL_CLD,
            CommandType::Test => CONTROL_TEST,
            CommandType::Msc => CONTROL_MSC,
            CommandType::Nsc => CONTROL_NSC,
            CommandType::Rpn => CONTROL_RPN,
            CommandType::Rls => CONTROL_RLS,
            CommandType::Snc => CONTROL_SNC,
        }
    }

    /// Look up a type byte, ignoring the C/R bit.
    pub fn from_code(code: u8) -> Option<Self> {
        match code & !CR {
            CONTROL_PN => Some(CommandType::Pn),
            CONTROL_PSC => Some(CommandType::Psc),
            CONTROL_CLD => Some(CommandType::Cld),
            CONTROL_TEST => Some(CommandType::Test),
            CONTROL_MSC => Some(CommandType::Msc),
            CONTROL_NSC => Some(CommandType::Nsc),
            CONTROL_RPN => Some(CommandType::Rpn),
            CONTROL_RLS => Some(CommandType::Rls),
            CONTROL_SNC => Some(CommandType::Snc),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandType::Pn => "PN",
            CommandType::Psc => "PSC",
            CommandType::Cld => "CLD",
            CommandType::Test => "TEST",
            CommandType::Msc => "MSC",
            CommandType::Nsc => "NSC",
            CommandType::Rpn => "RPN",
            CommandType::Rls => "RLS",
            CommandType::Snc => "SNC",
        }
    }
}

/// One control channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Type field as received, C/R bit included.
    type_field: Bytes,
    /// Value bytes.
    pub value: Bytes,
}

impl ControlMessage {
    /// A command (C/R set) of type `kind`.
    pub fn command(kind: CommandType, value: impl Into<Bytes>) -> Self {
        Self {
            type_field: Bytes::copy_from_slice(&[kind.code() | CR]),
            value: value.into(),
        }
    }

    /// A response (C/R clear) of type `kind`.
    pub fn response(kind: CommandType, value: impl Into<Bytes>) -> Self {
        Self {
            type_field: Bytes::copy_from_slice(&[kind.code()]),
            value: value.into(),
        }
    }

    /// MSC value for `dlci` carrying `signals`.
    pub fn modem_status(dlci: u8, signals: u8, command: bool) -> Self {
        let value = Bytes::copy_from_slice(&[EA | CR | (dlci << 2), signals]);
        if command {
            Self::command(CommandType::Msc, value)
        } else {
            Self::response(CommandType::Msc, value)
        }
    }

    /// Keep-alive probe.
    pub fn ping() -> Self {
        Self::command(CommandType::Test, PING_PATTERN)
    }

    /// Parse a DLCI 0 payload. Returns `None` for an empty or truncated
    /// type/length header.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let type_len = payload.iter().position(|b| b & EA != 0)? + 1;

        let mut pos = type_len;
        let mut length = 0usize;
        loop {
            let byte = *payload.get(pos)?;
            length = (length << 7) | usize::from(byte >> 1);
            pos += 1;
            if byte & EA != 0 {
                break;
            }
            if pos - type_len >= MAX_LENGTH_OCTETS {
                return None;
            }
        }

        let available = payload.len() - pos;
        if length > available {
            debug!(length, available, "control message shorter than its length field");
        }
        let end = pos + length.min(available);
        Some(Self {
            type_field: Bytes::copy_from_slice(&payload[..type_len]),
            value: Bytes::copy_from_slice(&payload[pos..end]),
        })
    }

    /// Wire encoding: type field, length field, value.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.type_field.len() + 4 + self.value.len());
        out.extend_from_slice(&self.type_field);
        put_length(&mut out, self.value.len());
        out.extend_from_slice(&self.value);
        out.freeze()
    }

    /// First type byte, C/R bit cleared.
    pub fn type_code(&self) -> u8 {
        self.type_field.first().copied().unwrap_or(0) & !CR
    }

    pub fn kind(&self) -> Option<CommandType> {
        CommandType::from_code(self.type_code())
    }

    /// Whether this is a command (C/R set) rather than a response.
    pub fn is_command(&self) -> bool {
        self.type_field.first().is_some_and(|b| b & CR != 0)
    }

    /// Same message with C/R cleared.
    pub fn to_response(&self) -> Self {
        let mut type_field = BytesMut::from(&self.type_field[..]);
        if let Some(first) = type_field.first_mut() {
            *first &= !CR;
        }
        Self {
            type_field: type_field.freeze(),
            value: self.value.clone(),
        }
    }

    /// NSC response rejecting this message.
    pub fn not_supported(&self) -> Self {
        Self::response(CommandType::Nsc, self.type_field.clone())
    }

    /// Target DLCI and V.24 signals of an MSC value.
    pub fn modem_status_target(&self) -> Option<(u8, u8)> {
        match self.value.as_ref() {
            [address, signals, ..] => Some(((address & 0xFC) >> 2, *signals)),
            _ => None,
        }
    }
}

fn put_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(EA | ((len as u8) << 1));
        return;
    }
    let mut groups = Vec::with_capacity(MAX_LENGTH_OCTETS);
    let mut rest = len;
    while rest > 0 {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
    }
    for (i, group) in groups.iter().rev().enumerate() {
        let ea = if i == groups.len() - 1 { EA } else { 0 };
        out.put_u8((group << 1) | ea);
    }
}

/// What a received control message means for the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Nothing beyond the reply.
    None,
    /// Peer requested mux termination.
    CloseDown,
    /// Peer reported V.24 signals for a channel.
    ModemStatus { dlci: u8, signals: u8 },
    /// Answer to one of our TEST commands.
    TestReply(Bytes),
    /// Peer did not support a command we sent.
    Rejected(Bytes),
    /// Peer acknowledged a command we sent.
    Acknowledged(u8),
}

/// Reply and event for one received control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub reply: Option<ControlMessage>,
    pub event: ControlEvent,
}

/// Decide how to answer `msg`.
///
/// Supported commands (CLD, PSC, TEST, MSC) are acknowledged by echoing
/// them with C/R cleared. Anything else gets an NSC response.
pub fn react(msg: &ControlMessage) -> Reaction {
    if !msg.is_command() {
        let event = match msg.kind() {
            Some(CommandType::Nsc) => {
                error!(rejected = ?msg.value.as_ref(), "modem did not support a command we sent");
                ControlEvent::Rejected(msg.value.clone())
            }
            Some(CommandType::Test) => ControlEvent::TestReply(msg.value.clone()),
            _ => {
                debug!(code = msg.type_code(), "command acknowledged by the modem");
                ControlEvent::Acknowledged(msg.type_code())
            }
        };
        return Reaction { reply: None, event };
    }

    let event = match msg.kind() {
        Some(CommandType::Cld) => {
            info!("modem requested mux termination");
            ControlEvent::CloseDown
        }
        Some(CommandType::Psc) => {
            debug!(len = msg.value.len(), "power saving control");
            ControlEvent::None
        }
        Some(CommandType::Test) => {
            debug!(len = msg.value.len(), "test command");
            ControlEvent::None
        }
        Some(CommandType::Msc) => match msg.modem_status_target() {
            Some((dlci, signals)) => ControlEvent::ModemStatus { dlci, signals },
            None => {
                error!(len = msg.value.len(), "modem status command without status");
                ControlEvent::None
            }
        },
        _ => {
            error!(code = msg.type_code(), "unsupported control command");
            return Reaction {
                reply: Some(msg.not_supported()),
                event: ControlEvent::None,
            };
        }
    };

    Reaction {
        reply: Some(msg.to_response()),
        event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_round_trip() {
        for kind in [
            CommandType::Pn,
            CommandType::Psc,
            CommandType::Cld,
            CommandType::Test,
            CommandType::Msc,
            CommandType::Nsc,
            CommandType::Rpn,
            CommandType::Rls,
            CommandType::Snc,
        ] {
            assert_eq!(CommandType::from_code(kind.code()), Some(kind));
            assert_eq!(CommandType::from_code(kind.code() | CR), Some(kind));
        }
        assert_eq!(CommandType::from_code(0xFD), None);
    }

    #[test]
    fn close_down_wire_bytes() {
        let cld = ControlMessage::command(CommandType::Cld, Bytes::new());
        assert_eq!(cld.encode().as_ref(), &[0xC3, 0x01]);
    }

    #[test]
    fn ping_wire_bytes() {
        assert_eq!(
            ControlMessage::ping().encode().as_ref(),
            b"\x23\x0dPING\r\n".as_ref()
        );
    }

    #[test]
    fn parse_modem_status() {
        let msg = ControlMessage::parse(&[0xE3, 0x05, 0x07, 0x0D]).unwrap();
        assert!(msg.is_command());
        assert_eq!(msg.kind(), Some(CommandType::Msc));
        assert_eq!(msg.modem_status_target(), Some((1, 0x0D)));
    }

    #[test]
    fn parse_rejects_truncated_header() {
        assert!(ControlMessage::parse(&[]).is_none());
        assert!(ControlMessage::parse(&[0xE2]).is_none());
        assert!(ControlMessage::parse(&[0xE3]).is_none());
        assert!(ControlMessage::parse(&[0xE3, 0x04, 0x00, 0x00, 0x00, 0x00]).is_none());
    }

    #[test]
    fn parse_clamps_value_to_payload() {
        let msg = ControlMessage::parse(&[0x23, 0x09, b'a', b'b']).unwrap();
        assert_eq!(msg.value.as_ref(), b"ab");
    }

    #[test]
    fn long_values_use_multi_octet_length() {
        let value = vec![0x55u8; 300];
        let msg = ControlMessage::command(CommandType::Test, value.clone());
        let wire = msg.encode();
        // 300 = 2 * 128 + 44
        assert_eq!(&wire[1..3], &[0x04, (44 << 1) | EA]);

        let parsed = ControlMessage::parse(&wire).unwrap();
        assert_eq!(parsed.value.as_ref(), value.as_slice());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn supported_commands_are_echoed_as_responses() {
        let test = ControlMessage::command(CommandType::Test, &b"abc"[..]);
        let reaction = react(&test);
        let reply = reaction.reply.unwrap();
        assert!(!reply.is_command());
        assert_eq!(reply.kind(), Some(CommandType::Test));
        assert_eq!(reply.value.as_ref(), b"abc");
        assert_eq!(reaction.event, ControlEvent::None);
    }

    #[test]
    fn close_down_command() {
        let reaction = react(&ControlMessage::command(CommandType::Cld, Bytes::new()));
        assert_eq!(reaction.event, ControlEvent::CloseDown);
        assert_eq!(reaction.reply.unwrap().encode().as_ref(), &[0xC1, 0x01]);
    }

    #[test]
    fn modem_status_command() {
        let msc = ControlMessage::modem_status(3, SIGNAL_FC | EA, true);
        let reaction = react(&msc);
        assert_eq!(
            reaction.event,
            ControlEvent::ModemStatus {
                dlci: 3,
                signals: SIGNAL_FC | EA
            }
        );
        assert_eq!(reaction.reply.unwrap(), msc.to_response());
    }

    #[test]
    fn modem_status_without_value_is_still_acknowledged() {
        let msc = ControlMessage::command(CommandType::Msc, Bytes::new());
        let reaction = react(&msc);
        assert_eq!(reaction.event, ControlEvent::None);
        assert!(reaction.reply.is_some());
    }

    #[test]
    fn unknown_command_gets_nsc() {
        let msg = ControlMessage::parse(&[0xFF, 0x01]).unwrap();
        let reply = react(&msg).reply.unwrap();
        assert_eq!(reply.kind(), Some(CommandType::Nsc));
        assert!(!reply.is_command());
        assert_eq!(reply.encode().as_ref(), &[0x11, 0x03, 0xFF]);
    }

    #[test]
    fn negotiation_commands_are_not_supported() {
        let pn = ControlMessage::command(CommandType::Pn, vec![0u8; 8]);
        assert_eq!(react(&pn).reply.unwrap().kind(), Some(CommandType::Nsc));
    }

    #[test]
    fn responses_are_not_answered() {
        let pong = ControlMessage::response(CommandType::Test, PING_PATTERN);
        let reaction = react(&pong);
        assert!(reaction.reply.is_none());
        assert_eq!(
            reaction.event,
            ControlEvent::TestReply(Bytes::from_static(PING_PATTERN))
        );

        let nsc = ControlMessage::response(CommandType::Nsc, &[0xC3][..]);
        assert!(matches!(react(&nsc).event, ControlEvent::Rejected(_)));

        let ack = ControlMessage::response(CommandType::Cld, Bytes::new());
        assert_eq!(react(&ack).event, ControlEvent::Acknowledged(CONTROL_CLD));
    }

    #[test]
    fn host_signals_value() {
        assert_eq!(HOST_SIGNALS, 0x8D);
    }
}
