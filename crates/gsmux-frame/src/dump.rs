//! Hex dumps of link traffic for trace logging.

use std::fmt::Write as _;

/// Format `bytes` as hex dump lines: offset, 16 hex bytes (a dash after
/// the eighth), then the printable characters.
pub fn hexdump_lines(prefix: &str, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let mut line = format!("{prefix}{:08x}: ", row * 16);
            for i in 0..16 {
                let sep = if i == 7 { '-' } else { ' ' };
                match chunk.get(i) {
                    Some(b) => {
                        let _ = write!(line, "{b:02x}{sep}");
                    }
                    None => {
                        let _ = write!(line, " .{sep}");
                    }
                }
            }
            line.push(' ');
            line.extend(chunk.iter().map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            }));
            line
        })
        .collect()
}

/// Emit a hex dump at trace level. Cheap when trace is disabled.
pub fn trace_dump(prefix: &str, bytes: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        for line in hexdump_lines(prefix, bytes) {
            tracing::trace!("{line}");
        }
    }
}

/// Lowercase hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_format() {
        let lines = hexdump_lines(">s ", b"AT+CMUX=0\r\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            ">s 00000000: 41 54 2b 43 4d 55 58 3d-30 0d 0a  .  .  .  .  .  AT+CMUX=0.."
        );
    }

    #[test]
    fn dump_multiple_rows() {
        let lines = hexdump_lines("<s ", &[0xF9; 20]);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("<s 00000010: f9 f9 f9 f9  ."));
        assert!(hexdump_lines("", &[]).is_empty());
    }

    #[test]
    fn hex_string() {
        assert_eq!(to_hex(&[0xF9, 0x03, 0x3F]), "f9033f");
    }
}
