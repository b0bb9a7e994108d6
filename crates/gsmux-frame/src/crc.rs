//! Frame check sequence: CRC-8, polynomial 0x07, reflected, seeded 0xFF,
//! transmitted complemented.

use std::fmt;

use crc::{Algorithm, Crc, Digest};

/// Register value that a valid frame (data followed by its FCS) ends on.
pub const GOOD_FCS: u8 = 0xCF;

/// The GSM 07.10 FCS: CRC-8/ROHC with the output complemented.
pub const GSM0710: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xFF,
    refin: true,
    refout: true,
    xorout: 0xFF,
    check: 0x2F,
    residue: GOOD_FCS,
};

static CRC: Crc<u8> = Crc::<u8>::new(&GSM0710);

/// Incremental CRC state.
#[derive(Clone)]
pub struct Crc8(Digest<'static, u8>);

impl Crc8 {
    pub fn new() -> Self {
        Self(CRC.digest())
    }

    pub fn update(&mut self, byte: u8) {
        self.0.update(&[byte]);
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// FCS byte to transmit.
    pub fn fcs(&self) -> u8 {
        self.0.clone().finalize()
    }

    /// True if `received` is the correct FCS for the bytes seen so far:
    /// running it through the register must land on [`GOOD_FCS`].
    pub fn check(&self, received: u8) -> bool {
        let mut digest = self.0.clone();
        digest.update(&[received]);
        digest.finalize() ^ GSM0710.xorout == GOOD_FCS
    }
}

impl Default for Crc8 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Crc8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Crc8").field(&self.fcs()).finish()
    }
}

/// FCS over `bytes`.
pub fn fcs(bytes: &[u8]) -> u8 {
    CRC.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_check_value() {
        assert_eq!(fcs(b"123456789"), GSM0710.check);
    }

    #[test]
    fn sabm_on_control_channel() {
        // F9 03 3F 01 1C F9 is the well-known SABM(P) for DLCI 0.
        assert_eq!(fcs(&[0x03, 0x3F, 0x01]), 0x1C);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut crc = Crc8::new();
        crc.update(0x07);
        crc.update_slice(&[0xEF, 0x0B]);
        assert_eq!(crc.fcs(), fcs(&[0x07, 0xEF, 0x0B]));
    }

    #[test]
    fn check_accepts_own_fcs() {
        for data in [&b""[..], b"\x03", b"\x07\xEF\x0B", b"HELLO world"] {
            let mut crc = Crc8::new();
            crc.update_slice(data);
            assert!(crc.check(crc.fcs()));
            assert!(!crc.check(crc.fcs() ^ 0x01));
        }
    }
}
