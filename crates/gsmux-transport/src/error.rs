use std::io::ErrorKind;
use std::path::PathBuf;

/// Errors that can occur in link and endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the physical link device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to configure the physical link (baud rate, modem lines).
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested baud rate is not one the CMUX command can express.
    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    /// Failed to allocate or configure a pseudo-terminal.
    #[error("pseudo-terminal setup failed: {0}")]
    Pty(std::io::Error),

    /// Failed to publish the endpoint name link.
    #[error("failed to link {link} -> {target}: {source}")]
    Link {
        link: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Returns true for I/O errors that only mean "no data right now".
///
/// Streams in gsmux are polled with short read timeouts, so a timed-out or
/// interrupted read is retried at the next poll rather than treated as a
/// link fault.
pub fn is_idle(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_kinds() {
        assert!(is_idle(&std::io::Error::from(ErrorKind::WouldBlock)));
        assert!(is_idle(&std::io::Error::from(ErrorKind::TimedOut)));
        assert!(is_idle(&std::io::Error::from(ErrorKind::Interrupted)));
        assert!(!is_idle(&std::io::Error::from(ErrorKind::BrokenPipe)));
        assert!(!is_idle(&std::io::Error::other("io fault")));
    }
}
