use bytes::BytesMut;
use gsmux_frame::dump::to_hex;
use gsmux_frame::{encode_frame, FrameConfig, FrameType};
use serde::Serialize;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_raw, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    dlci: u8,
    frame_type: &'a str,
    poll_final: bool,
    payload_size: usize,
    wire: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame_type = FrameType::from_name(&args.frame_type).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("unknown frame type {:?} (expected sabm, ua, dm, disc, uih or ui)", args.frame_type),
        )
    })?;
    let payload = match (&args.data, &args.hex) {
        (Some(text), _) => text.as_bytes().to_vec(),
        (None, Some(hex)) => {
            parse_hex(hex).map_err(|err| CliError::new(USAGE, format!("--hex: {err}")))?
        }
        (None, None) => Vec::new(),
    };
    let control = if args.pf {
        frame_type.with_pf()
    } else {
        frame_type.control()
    };

    let config = FrameConfig::with_mode(args.mode.into());
    let mut wire = BytesMut::new();
    let taken = encode_frame(args.dlci, control, &payload, &config, &mut wire)
        .map_err(|err| frame_error("encode failed", err))?;
    if taken < payload.len() {
        return Err(CliError::new(
            USAGE,
            format!(
                "payload of {} bytes exceeds the frame size {}",
                payload.len(),
                config.max_frame_size
            ),
        ));
    }

    let hex = to_hex(&wire);
    match format {
        OutputFormat::Json => {
            let out = EncodeOutput {
                dlci: args.dlci,
                frame_type: frame_type.name(),
                poll_final: args.pf,
                payload_size: payload.len(),
                wire: hex,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Raw => print_raw(&wire),
        OutputFormat::Table | OutputFormat::Pretty => println!("{hex}"),
    }
    Ok(SUCCESS)
}
