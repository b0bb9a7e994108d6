mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "gsmux", version, about = "GSM 07.10 serial multiplexer")]
struct Cli {
    /// Output format for decode/encode.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format.
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true, env = "GSMUX_LOG_FORMAT")]
    log_format: LogFormat,

    /// Minimum log level.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true, env = "GSMUX_LOG_LEVEL")]
    log_level: LogLevel,

    /// Syslog-style verbosity 0..=7; overrides --log-level.
    #[arg(
        short = 'v',
        long,
        value_name = "N",
        global = true,
        value_parser = clap::value_parser!(u8).range(0..=7)
    )]
    verbosity: Option<u8>,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH", global = true, env = "GSMUX_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let level = cli
        .verbosity
        .map(LogLevel::from_verbosity)
        .unwrap_or(cli.log_level);
    if let Err(err) = init_logging(cli.log_format, level, cli.log_file.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "gsmux",
            "run",
            "--device",
            "/dev/ttyUSB2",
            "--channels",
            "4",
            "--mode",
            "advanced",
            "--ps-channels",
            "3,4",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.channels, 4);
        assert_eq!(args.ps_channels, vec![3, 4]);
    }

    #[test]
    fn rejects_out_of_range_channels() {
        let err = Cli::try_parse_from(["gsmux", "run", "--channels", "32"])
            .expect_err("32 channels should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_unsupported_baud_rate() {
        let err = Cli::try_parse_from(["gsmux", "run", "--baud", "14400"])
            .expect_err("14400 baud should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn verbosity_overrides_level() {
        let cli = Cli::try_parse_from(["gsmux", "-v", "7", "version"]).expect("should parse");
        assert_eq!(cli.verbosity, Some(7));
        assert!(Cli::try_parse_from(["gsmux", "-v", "8", "version"]).is_err());
    }

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["gsmux", "decode", "--hex", "f9 03 3f 01 1c f9"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
    }
}
