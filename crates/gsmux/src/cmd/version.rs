use gsmux_frame::{Mode, DEFAULT_FRAME_SIZE, MAX_CHANNELS};
use gsmux_transport::BAUD_RATES;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

/// Build provenance plus the protocol limits this binary was built with.
#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    git_hash: &'static str,
    /// Wire modes and the `AT+CMUX=` value that selects each.
    modes: Vec<(&'static str, u8)>,
    default_frame_size: usize,
    max_logical_channels: usize,
    baud_rates: &'static [u32],
    async_codec: bool,
}

impl VersionInfo {
    fn collect() -> Self {
        Self {
            name: "gsmux",
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("GSMUX_BUILD_TARGET").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            modes: [Mode::Basic, Mode::Advanced]
                .into_iter()
                .map(|mode| (mode_name(mode), mode.cmux_value()))
                .collect(),
            default_frame_size: DEFAULT_FRAME_SIZE,
            max_logical_channels: MAX_CHANNELS - 1,
            baud_rates: &BAUD_RATES,
            async_codec: cfg!(feature = "async"),
        }
    }
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Basic => "basic",
        Mode::Advanced => "advanced",
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("gsmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let info = VersionInfo::collect();
    if let OutputFormat::Json = format {
        println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    let modes: Vec<String> = info
        .modes
        .iter()
        .map(|(name, cmux)| format!("{name} (AT+CMUX={cmux})"))
        .collect();
    println!("{} {} ({})", info.name, info.version, info.target);
    println!("git: {}", info.git_hash);
    println!("modes: {}", modes.join(", "));
    println!("frame size (N1) default: {}", info.default_frame_size);
    println!("logical channels: 1..={}", info.max_logical_channels);
    println!("baud rates: {:?}", info.baud_rates);
    println!("async codec: {}", info.async_codec);

    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_info_reports_protocol_limits() {
        let json = serde_json::to_value(VersionInfo::collect()).unwrap();
        assert_eq!(json["name"], "gsmux");
        assert_eq!(json["default_frame_size"], 1509);
        assert_eq!(json["max_logical_channels"], 31);
        assert_eq!(json["modes"][0], serde_json::json!(["basic", 0]));
        assert_eq!(json["modes"][1], serde_json::json!(["advanced", 1]));
        assert!(json["baud_rates"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!(115200)));
    }
}
