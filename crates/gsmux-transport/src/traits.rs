use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A duplex byte stream to the modem. Implements Read + Write.
///
/// This is the physical link the multiplexer owns. On real hardware it
/// wraps a serial port; a unix socket variant carries the same protocol to
/// modem emulators and test harnesses.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Serial(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl LinkStream {
    /// Create a LinkStream from an opened serial port.
    pub(crate) fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
        }
    }

    /// Create a LinkStream from a connected unix socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Connect to a unix socket that speaks the modem side of the link.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            crate::error::TransportError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(?path, "connected to unix socket link");
        Ok(Self::from_unix(stream))
    }

    /// Set the read timeout. A read that times out reports an idle error
    /// (see [`crate::is_idle`]) instead of blocking forever.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port
                .set_timeout(timeout)
                .map_err(|err| std::io::Error::from(err).into()),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => {
                stream.set_read_timeout(Some(timeout)).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream so reads and writes can run on different
    /// threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Serial(port) => {
                let cloned = port.try_clone().map_err(std::io::Error::from)?;
                Ok(Self::from_serial(cloned))
            }
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Serial(_) => "serial",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix-socket",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            LinkStreamInner::Serial(port) => f
                .debug_struct("LinkStream")
                .field("type", &"serial")
                .field("name", &port.name())
                .finish(),
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => f
                .debug_struct("LinkStream")
                .field("type", &"unix-socket")
                .finish(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn unix_link_roundtrip() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = LinkStream::from_unix(left);
        let mut modem = LinkStream::from_unix(right);

        host.write_all(b"AT\r\n").unwrap();
        let mut buf = [0u8; 4];
        modem.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AT\r\n");
        assert_eq!(host.kind(), "unix-socket");
    }

    #[test]
    fn read_timeout_reports_idle() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = LinkStream::from_unix(left);
        host.set_read_timeout(Duration::from_millis(10)).unwrap();

        let mut buf = [0u8; 8];
        let err = host.read(&mut buf).unwrap_err();
        assert!(crate::is_idle(&err), "unexpected error kind {:?}", err.kind());
        assert_ne!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn cloned_halves_share_the_link() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let host = LinkStream::from_unix(left);
        let mut writer = host.try_clone().unwrap();
        let mut reader = LinkStream::from_unix(right);

        writer.write_all(&[0xF9, 0x03]).unwrap();
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xF9, 0x03]);
    }

    #[test]
    fn connect_unix_missing_path_is_open_error() {
        let err = LinkStream::connect_unix("/nonexistent/gsmux-link.sock").unwrap_err();
        assert!(matches!(err, crate::TransportError::Open { .. }));
    }
}
