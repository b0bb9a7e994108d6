//! AT command exchange that switches the modem into multiplexer mode.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use gsmux_frame::codec::FILL_BYTE;
use gsmux_frame::{FillPolicy, FrameConfig, FrameType, FrameWriter, Mode, CONTROL_DLCI};
use gsmux_transport::is_idle;
use tracing::{debug, info, warn};

use crate::config::MuxConfig;
use crate::control::{CommandType, ControlMessage};
use crate::error::{MuxError, Result};

const REPLY_OK: &[u8] = b"OK";
const REPLY_ERROR: &[u8] = b"ERROR";
const MAX_REPLY: usize = 1024;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Send `command` and wait for a reply containing `OK` or `ERROR`.
///
/// `command` is sent verbatim (include the trailing `\r`), followed by any
/// fill bytes the policy asks for.
pub fn chat<S: Read + Write>(
    link: &mut S,
    command: &str,
    timeout: Duration,
    fill: FillPolicy,
) -> Result<()> {
    let name = command.trim_end().to_string();
    debug!(command = %name, "AT command");

    let mut out = command.as_bytes().to_vec();
    out.resize(out.len() + fill.padding(command.len()), FILL_BYTE);
    FrameWriter::new(&mut *link).write_raw(&out)?;

    let deadline = Instant::now() + timeout;
    let mut reply = Vec::new();
    let mut chunk = [0u8; 256];
    while Instant::now() < deadline {
        match link.read(&mut chunk) {
            Ok(0) => return Err(MuxError::Disconnected),
            Ok(n) => {
                reply.extend_from_slice(&chunk[..n]);
                if contains(&reply, REPLY_OK) {
                    debug!(command = %name, "modem answered OK");
                    return Ok(());
                }
                if contains(&reply, REPLY_ERROR) {
                    warn!(command = %name, "modem answered ERROR");
                    return Err(MuxError::AtRejected(name));
                }
                if reply.len() > MAX_REPLY {
                    reply.drain(..reply.len() - REPLY_ERROR.len());
                }
            }
            Err(err) if is_idle(&err) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Err(MuxError::AtTimeout {
        command: name,
        timeout,
    })
}

/// Send a close-down command in both wire encodings, for a modem still
/// stuck in a previous mux session.
fn force_close_down<S: Write>(link: &mut S, frame: &FrameConfig) -> Result<()> {
    let cld: Bytes = ControlMessage::command(CommandType::Cld, Bytes::new()).encode();
    for mode in [Mode::Basic, Mode::Advanced] {
        let config = FrameConfig {
            mode,
            ..frame.clone()
        };
        FrameWriter::with_config(&mut *link, config).send(
            CONTROL_DLCI,
            FrameType::Uih.control(),
            &cld,
        )?;
    }
    Ok(())
}

/// Run the AT sequence: probe, disable echo, unlock the SIM if a PIN is
/// configured, then enable the multiplexer in the configured mode.
pub fn negotiate<S: Read + Write>(link: &mut S, config: &MuxConfig) -> Result<()> {
    let fill = config.frame.fill;
    let timeouts = &config.at;

    if let Err(err) = chat(link, "AT\r", timeouts.probe, fill) {
        warn!(%err, "modem not responding to AT; closing any stale mux session");
        force_close_down(link, &config.frame)?;
        chat(link, "AT\r", timeouts.probe, fill)?;
    }
    chat(link, "ATE0\r", timeouts.probe, fill)?;

    if let Some(pin) = config.pin {
        chat(link, &format!("AT+CPIN={pin:04}\r"), timeouts.pin, fill)?;
    }

    let cmux = format!("AT+CMUX={}\r", config.frame.mode.cmux_value());
    chat(link, &cmux, timeouts.cmux, fill)?;
    info!(mode = ?config.frame.mode, "modem switched to mux mode");
    Ok(())
}
