use std::time::Duration;

/// Errors that can occur while running the multiplexer.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] gsmux_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] gsmux_frame::FrameError),

    /// The modem answered an AT command with ERROR.
    #[error("modem rejected {0:?}")]
    AtRejected(String),

    /// The modem did not answer an AT command in time.
    #[error("no reply to {command:?} within {timeout:?}")]
    AtTimeout { command: String, timeout: Duration },

    /// Channel count outside 1..=31.
    #[error("invalid channel count {0} (expected 1..=31)")]
    InvalidChannelCount(u8),

    /// DLCI outside the configured channel table.
    #[error("unknown channel {0}")]
    UnknownChannel(u8),

    /// No physical link is attached.
    #[error("link is not connected")]
    Disconnected,

    /// A worker thread could not be started.
    #[error("failed to spawn {name}: {source}")]
    ThreadSpawn {
        name: String,
        source: std::io::Error,
    },

    /// A channel endpoint could not be allocated.
    #[error("failed to open endpoint for channel {dlci}: {reason}")]
    Endpoint { dlci: u8, reason: String },

    /// Condition that stops the multiplexer for good.
    #[error("fatal: {0}")]
    Fatal(String),

    /// I/O error outside the link stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MuxError>;

impl MuxError {
    /// Errors the watchdog cannot recover from by resetting the link.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MuxError::Endpoint { .. } | MuxError::ThreadSpawn { .. } | MuxError::Fatal(_)
        )
    }
}
