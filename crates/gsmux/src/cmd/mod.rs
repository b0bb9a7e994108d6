use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use gsmux_frame::Mode;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the multiplexer daemon.
    Run(RunArgs),
    /// Decode captured link bytes into frames.
    Decode(DecodeArgs),
    /// Print the wire bytes of one frame.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Wire mode as given on the command line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    #[default]
    Basic,
    Advanced,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Basic => Mode::Basic,
            ModeArg::Advanced => Mode::Advanced,
        }
    }
}

fn parse_baud(input: &str) -> Result<u32, String> {
    let baud: u32 = input
        .parse()
        .map_err(|_| format!("invalid baud rate: {input}"))?;
    if gsmux_transport::baud_rate_index(baud).is_none() {
        return Err(format!(
            "unsupported baud rate {baud} (expected one of {:?})",
            gsmux_transport::BAUD_RATES
        ));
    }
    Ok(baud)
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial device connected to the modem.
    #[arg(long, short = 'p', default_value = "/dev/ttyS0", env = "GSMUX_DEVICE")]
    pub device: PathBuf,
    /// Connect to a modem emulator on this unix socket instead of a serial
    /// device.
    #[arg(long, value_name = "PATH", env = "GSMUX_UNIX", conflicts_with = "device")]
    pub unix: Option<PathBuf>,
    /// Serial line speed.
    #[arg(long, short = 'b', default_value = "115200", value_parser = parse_baud, env = "GSMUX_BAUD")]
    pub baud: u32,
    /// Use RTS/CTS hardware flow control on the serial line.
    #[arg(long, env = "GSMUX_RTSCTS")]
    pub rtscts: bool,
    /// Multiplexer wire mode.
    #[arg(long, short = 'm', value_enum, default_value = "basic", env = "GSMUX_MODE")]
    pub mode: ModeArg,
    /// Maximum payload per frame (N1).
    #[arg(
        long,
        short = 'f',
        default_value = "1509",
        value_parser = clap::value_parser!(u16).range(1..=32768),
        env = "GSMUX_FRAME_SIZE"
    )]
    pub frame_size: u16,
    /// Logical channels to open.
    #[arg(
        long,
        short = 'n',
        default_value = "2",
        value_parser = clap::value_parser!(u8).range(1..=31),
        env = "GSMUX_CHANNELS"
    )]
    pub channels: u8,
    /// SIM PIN to submit before muxing.
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=9999), env = "GSMUX_PIN", hide_env_values = true)]
    pub pin: Option<u16>,
    /// Unanswered keep-alive probes before the link is reset (0 disables).
    #[arg(long, default_value = "0", env = "GSMUX_PING")]
    pub ping: u32,
    /// Reset the link after this many seconds without a frame.
    #[arg(long, short = 't', value_name = "SECS", env = "GSMUX_TIMEOUT")]
    pub timeout: Option<u64>,
    /// Watchdog tick in seconds.
    #[arg(long, value_name = "SECS", default_value = "5", env = "GSMUX_WATCHDOG_INTERVAL")]
    pub interval: u64,
    /// Echo every data frame back to the modem.
    #[arg(long)]
    pub loop_test: bool,
    /// Append N fill bytes after each basic mode frame and AT command.
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "31", conflicts_with = "fill_fix_align")]
    pub fill_fix: Option<usize>,
    /// Pad each basic mode frame to a multiple of N bytes.
    #[arg(long, value_name = "N")]
    pub fill_fix_align: Option<usize>,
    /// Channels carrying length-prefixed packet data.
    #[arg(long, value_delimiter = ',', env = "GSMUX_PS_CHANNELS")]
    pub ps_channels: Vec<u8>,
    /// Directory for stable per-channel links (`gsmux<N>`).
    #[arg(long, value_name = "DIR", env = "GSMUX_LINK_DIR")]
    pub link_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex string of captured bytes (whitespace allowed).
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read captured bytes from a file (raw binary).
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Wire mode of the capture.
    #[arg(long, short = 'm', value_enum, default_value = "basic")]
    pub mode: ModeArg,
    /// Maximum payload per frame (N1) the capture was made with.
    #[arg(long, default_value = "1509")]
    pub frame_size: usize,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Channel (DLCI).
    #[arg(long, short = 'c', default_value = "0", value_parser = clap::value_parser!(u8).range(0..=63))]
    pub dlci: u8,
    /// Frame type: sabm, ua, dm, disc, uih or ui.
    #[arg(long = "type", short = 't', default_value = "uih")]
    pub frame_type: String,
    /// Set the poll/final bit.
    #[arg(long)]
    pub pf: bool,
    /// Payload text.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Payload as hex.
    #[arg(long)]
    pub hex: Option<String>,
    /// Wire mode.
    #[arg(long, short = 'm', value_enum, default_value = "basic")]
    pub mode: ModeArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse hex digits, ignoring whitespace, `:` and `0x` prefixes.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if !digits.is_ascii() {
        return Err("hex input contains non-ASCII characters".to_string());
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte {:?}", &digits[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("f9 03 3F").unwrap(), vec![0xF9, 0x03, 0x3F]);
        assert_eq!(parse_hex("0xf9:0x03").unwrap(), vec![0xF9, 0x03]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("f9 0").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn baud_validation() {
        assert_eq!(parse_baud("921600").unwrap(), 921600);
        assert!(parse_baud("14400").is_err());
        assert!(parse_baud("fast").is_err());
    }
}
