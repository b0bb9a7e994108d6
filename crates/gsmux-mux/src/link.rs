//! Where the watchdog gets its physical link from.

use std::path::PathBuf;

use gsmux_transport::{open_serial, LinkStream, SerialConfig};

/// Opens the physical link. Called on every Opening tick until it
/// succeeds, so failures are expected and retried.
pub trait LinkProvider: Send {
    fn open(&mut self) -> gsmux_transport::Result<LinkStream>;

    /// Human-readable link description for logs.
    fn describe(&self) -> String;
}

/// A serial port.
#[derive(Debug, Clone)]
pub struct SerialLink {
    config: SerialConfig,
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl LinkProvider for SerialLink {
    fn open(&mut self) -> gsmux_transport::Result<LinkStream> {
        open_serial(&self.config)
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.config.path.display(), self.config.baud_rate)
    }
}

/// A unix socket speaking the modem side of the link (modem emulators).
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixLink {
    path: PathBuf,
}

#[cfg(unix)]
impl UnixLink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
impl LinkProvider for UnixLink {
    fn open(&mut self) -> gsmux_transport::Result<LinkStream> {
        LinkStream::connect_unix(&self.path)
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

impl<F> LinkProvider for F
where
    F: FnMut() -> gsmux_transport::Result<LinkStream> + Send,
{
    fn open(&mut self) -> gsmux_transport::Result<LinkStream> {
        self()
    }

    fn describe(&self) -> String {
        "custom link".to_string()
    }
}
