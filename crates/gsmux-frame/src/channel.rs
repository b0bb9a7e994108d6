//! Wire constants and frame types.
//!
//! DLCI 0 is the control channel. DLCIs 1-31 carry application data.

/// Basic mode frame delimiter.
pub const BASIC_FLAG: u8 = 0xF9;

/// Advanced mode frame delimiter.
pub const ADVANCED_FLAG: u8 = 0x7E;

/// Advanced mode escape byte.
pub const ESCAPE: u8 = 0x7D;

/// Escaped bytes are sent as `ESCAPE, byte ^ ESCAPE_MASK`.
pub const ESCAPE_MASK: u8 = 0x20;

/// Bytes that must be escaped in advanced mode: flag, escape, XON and XOFF
/// (with and without parity).
pub const ESCAPED_BYTES: [u8; 6] = [ADVANCED_FLAG, ESCAPE, 0x11, 0x91, 0x13, 0x93];

/// Extension bit (address, length and control-command fields).
pub const EA: u8 = 0x01;

/// Command/response bit.
pub const CR: u8 = 0x02;

/// Poll/final bit in the control byte.
pub const PF: u8 = 0x10;

/// The control channel.
pub const CONTROL_DLCI: u8 = 0;

/// Channel slots including the control channel.
pub const MAX_CHANNELS: usize = 32;

/// Default maximum frame payload (N1).
pub const DEFAULT_FRAME_SIZE: usize = 1509;

/// Frame type carried in the control byte, P/F bit excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Set asynchronous balanced mode (open request).
    Sabm,
    /// Unnumbered acknowledgement.
    Ua,
    /// Disconnected mode.
    Dm,
    /// Disconnect (close request).
    Disc,
    /// Unnumbered information with header check.
    Uih,
    /// Unnumbered information.
    Ui,
}

impl FrameType {
    /// All frame types.
    pub const ALL: [FrameType; 6] = [
        FrameType::Sabm,
        FrameType::Ua,
        FrameType::Dm,
        FrameType::Disc,
        FrameType::Uih,
        FrameType::Ui,
    ];

    /// Control byte value with the P/F bit clear.
    pub const fn control(self) -> u8 {
        match self {
            FrameType::Sabm => 0x2F,
            FrameType::Ua => 0x63,
            FrameType::Dm => 0x0F,
            FrameType::Disc => 0x43,
            FrameType::Uih => 0xEF,
            FrameType::Ui => 0x03,
        }
    }

    /// Control byte value with the P/F bit set.
    pub const fn with_pf(self) -> u8 {
        self.control() | PF
    }

    /// Classify a control byte, ignoring the P/F bit.
    pub fn from_control(control: u8) -> Option<Self> {
        let bare = control & !PF;
        Self::ALL.into_iter().find(|t| t.control() == bare)
    }

    /// Whether this type carries a payload (UI or UIH).
    pub fn is_information(self) -> bool {
        matches!(self, FrameType::Uih | FrameType::Ui)
    }

    /// Short protocol name.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Sabm => "SABM",
            FrameType::Ua => "UA",
            FrameType::Dm => "DM",
            FrameType::Disc => "DISC",
            FrameType::Uih => "UIH",
            FrameType::Ui => "UI",
        }
    }

    /// Parse a protocol name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_bytes_ignore_pf() {
        assert_eq!(FrameType::from_control(0x3F), Some(FrameType::Sabm));
        assert_eq!(FrameType::from_control(0x2F), Some(FrameType::Sabm));
        assert_eq!(FrameType::from_control(0x73), Some(FrameType::Ua));
        assert_eq!(FrameType::from_control(0xFF), Some(FrameType::Uih));
        assert_eq!(FrameType::from_control(0x13), Some(FrameType::Ui));
        assert_eq!(FrameType::from_control(0x55), None);
    }

    #[test]
    fn names_roundtrip() {
        for t in FrameType::ALL {
            assert_eq!(FrameType::from_name(t.name()), Some(t));
        }
        assert_eq!(FrameType::from_name("uih"), Some(FrameType::Uih));
        assert_eq!(FrameType::from_name("bogus"), None);
    }

    #[test]
    fn information_types() {
        assert!(FrameType::Uih.is_information());
        assert!(FrameType::Ui.is_information());
        assert!(!FrameType::Sabm.is_information());
        assert!(!FrameType::Disc.is_information());
    }
}
