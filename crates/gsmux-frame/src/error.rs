/// Errors that can occur during frame encoding and stream decoding.
///
/// Corrupt input on the link is not an error; see [`crate::Decoded`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The DLCI does not fit the 6-bit address field.
    #[error("invalid DLCI {0} (max 63)")]
    InvalidDlci(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
