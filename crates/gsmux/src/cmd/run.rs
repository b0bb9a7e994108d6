use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gsmux_frame::{FillPolicy, FrameConfig};
use gsmux_mux::{LinkProvider, Mux, MuxConfig, MuxError, PtyEndpoints, SerialLink, UnixLink, Watchdog};
use gsmux_transport::SerialConfig;
use tracing::info;

use crate::cmd::RunArgs;
use crate::exit::{mux_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let config = mux_config(&args);
    let mut endpoints = PtyEndpoints::new();
    if let Some(dir) = &args.link_dir {
        endpoints = endpoints.with_link_dir(dir);
    }
    let mux = Mux::new(config, Arc::new(endpoints))
        .map_err(|err| mux_error("invalid configuration", err))?;

    let exit = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&exit))?;

    let result = match &args.unix {
        Some(path) => supervise(Watchdog::new(Arc::clone(&mux), UnixLink::new(path)), &exit),
        None => {
            let serial = SerialConfig {
                baud_rate: args.baud,
                hardware_flow_control: args.rtscts,
                ..SerialConfig::new(&args.device)
            };
            supervise(Watchdog::new(Arc::clone(&mux), SerialLink::new(serial)), &exit)
        }
    };

    match result {
        Ok(()) => Ok(SUCCESS),
        Err(MuxError::Fatal(reason)) => Err(CliError::new(FAILURE, format!("multiplexer stopped: {reason}"))),
        Err(err) => Err(mux_error("multiplexer stopped", err)),
    }
}

fn supervise<L: LinkProvider>(mut watchdog: Watchdog<L>, exit: &AtomicBool) -> gsmux_mux::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        channels = watchdog.mux().config().channels,
        "gsmux starting"
    );
    watchdog.run(exit)
}

fn mux_config(args: &RunArgs) -> MuxConfig {
    let fill = match (args.fill_fix, args.fill_fix_align) {
        (Some(n), _) => FillPolicy::Fixed(n),
        (None, Some(block)) => FillPolicy::Align(block),
        (None, None) => FillPolicy::Off,
    };
    MuxConfig {
        frame: FrameConfig {
            max_frame_size: usize::from(args.frame_size),
            fill,
            ..FrameConfig::with_mode(args.mode.into())
        },
        channels: args.channels,
        pin: args.pin,
        ping_probes: args.ping,
        idle_timeout: args.timeout.filter(|&secs| secs > 0).map(Duration::from_secs),
        watchdog_interval: Duration::from_secs(args.interval.max(1)),
        loop_test: args.loop_test,
        ps_channels: args.ps_channels.clone(),
        ..MuxConfig::default()
    }
}

fn install_ctrlc_handler(exit: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        exit.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
