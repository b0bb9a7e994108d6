use std::fs;

use gsmux_frame::{decode, Decoded, FrameConfig};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_records, FrameRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = read_input(&args)?;
    let config = FrameConfig {
        max_frame_size: args.frame_size,
        ..FrameConfig::with_mode(args.mode.into())
    };

    let records = decode_all(&bytes, &config);
    print_records(&records, format);

    if records.iter().any(|r| r.status == "ok") || bytes.is_empty() {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(DATA_INVALID, "no valid frames in input"))
    }
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex).map_err(|err| CliError::new(USAGE, format!("--hex: {err}")));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --hex or --file is required"))
}

/// Walk `bytes` the way the assembler does: frames are listed, corrupt
/// regions are reported and skipped, and trailing bytes that never form a
/// frame are reported as incomplete.
pub fn decode_all(bytes: &[u8], config: &FrameConfig) -> Vec<FrameRecord> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        match decode(bytes[offset..].into(), config) {
            Decoded::Frame { frame, consumed } => {
                let start = bytes[offset..offset + consumed]
                    .iter()
                    .position(|&b| b == config.mode.flag())
                    .map_or(offset, |p| offset + p);
                records.push(FrameRecord::frame(start, &frame));
                offset += consumed;
            }
            Decoded::Corrupt { consumed, reason } => {
                records.push(FrameRecord::corrupt(offset, consumed, reason));
                offset += consumed.max(1);
            }
            Decoded::Incomplete { discard, started } => {
                offset += discard;
                if started {
                    records.push(FrameRecord::incomplete(offset, bytes.len() - offset));
                }
                break;
            }
        }
    }
    records
}
