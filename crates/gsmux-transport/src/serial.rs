use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// Baud rates the +CMUX port speed parameter can express, in CMUX index order
/// starting at index 1.
pub const BAUD_RATES: [u32; 9] = [
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 3_000_000,
];

/// Default poll timeout for link reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// CMUX port speed index for a baud rate (9600 -> 1 ... 3000000 -> 9).
pub fn baud_rate_index(baud_rate: u32) -> Option<usize> {
    BAUD_RATES
        .iter()
        .position(|&rate| rate == baud_rate)
        .map(|i| i + 1)
}

/// Serial line configuration for the physical link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: PathBuf,
    /// Line speed. Must be one of [`BAUD_RATES`].
    pub baud_rate: u32,
    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
    /// Poll timeout for reads.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Configuration for `path` at 115200 baud, no hardware flow control.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: 115200,
            hardware_flow_control: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Open and configure the serial device: raw 8N1, requested speed, DTR and
/// RTS raised.
pub fn open_serial(config: &SerialConfig) -> Result<LinkStream> {
    if baud_rate_index(config.baud_rate).is_none() {
        return Err(TransportError::UnsupportedBaudRate(config.baud_rate));
    }

    let path = config.path.to_string_lossy().into_owned();
    let flow_control = if config.hardware_flow_control {
        serialport::FlowControl::Hardware
    } else {
        serialport::FlowControl::None
    };

    let mut port = serialport::new(path, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(flow_control)
        .timeout(config.read_timeout)
        .open()
        .map_err(|err| TransportError::Open {
            path: config.path.clone(),
            source: err.into(),
        })?;
    info!(path = ?config.path, baud = config.baud_rate, "opened serial port");

    let configure = |err: serialport::Error| TransportError::Configure {
        path: config.path.clone(),
        source: err.into(),
    };
    port.write_data_terminal_ready(true).map_err(configure)?;
    port.write_request_to_send(true).map_err(configure)?;
    port.clear(serialport::ClearBuffer::All).map_err(configure)?;
    debug!(path = ?config.path, "configured serial device");

    Ok(LinkStream::from_serial(port))
}
