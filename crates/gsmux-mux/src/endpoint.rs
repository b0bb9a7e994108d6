//! Application side of each logical channel.
//!
//! An [`EndpointFactory`] hands out one duplex byte stream per DLCI (a
//! pseudo-terminal in production), and a [`ChannelReader`] decides how
//! bytes read from it are grouped into records before they are framed.

use std::any::Any;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// Read buffer size for raw channels.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Application byte stream for one channel.
pub struct Endpoint {
    name: String,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    guard: Option<Box<dyn Any + Send>>,
}

impl Endpoint {
    /// `reader` must time out periodically (see [`gsmux_transport::is_idle`])
    /// so the channel thread can notice shutdown.
    pub fn new(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
            guard: None,
        }
    }

    /// Keep `guard` alive for as long as the endpoint is attached.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Name shown to applications (device path or link).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn split(self) -> (Box<dyn Read + Send>, EndpointSink) {
        (
            self.reader,
            EndpointSink {
                name: self.name,
                writer: self.writer,
                _guard: self.guard,
            },
        )
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("name", &self.name).finish()
    }
}

/// Write half of an attached endpoint, owned by the channel slot.
pub(crate) struct EndpointSink {
    pub name: String,
    pub writer: Box<dyn Write + Send>,
    _guard: Option<Box<dyn Any + Send>>,
}

/// Allocates the application endpoint for a channel.
pub trait EndpointFactory: Send + Sync {
    fn open(&self, dlci: u8) -> Result<Endpoint>;
}

/// How application bytes are grouped before framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingPolicy {
    /// Forward whatever one read returns.
    #[default]
    Raw,
    /// Each record is preceded by a 2-byte little-endian length, used by
    /// packet data channels. Only the record is forwarded.
    LengthPrefixed,
}

impl FramingPolicy {
    pub fn reader(self) -> Box<dyn ChannelReader> {
        match self {
            FramingPolicy::Raw => Box::new(RawReader),
            FramingPolicy::LengthPrefixed => Box::new(LengthPrefixedReader::default()),
        }
    }
}

/// Reads one record of application data.
pub trait ChannelReader: Send {
    /// Append the next record to `out`. Returns the record length, or 0 when
    /// the application closed its end. Idle errors leave any partial record
    /// buffered for the next call.
    fn read_record(&mut self, src: &mut dyn Read, out: &mut Vec<u8>) -> io::Result<usize>;
}

/// Passes reads through unchanged.
#[derive(Debug, Default)]
pub struct RawReader;

impl ChannelReader for RawReader {
    fn read_record(&mut self, src: &mut dyn Read, out: &mut Vec<u8>) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = src.read(&mut chunk)?;
        out.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

/// Reads `len:u16le` + `len` bytes records.
#[derive(Debug, Default)]
pub struct LengthPrefixedReader {
    header: [u8; 2],
    header_len: usize,
    record: Vec<u8>,
    expected: Option<usize>,
}

impl ChannelReader for LengthPrefixedReader {
    fn read_record(&mut self, src: &mut dyn Read, out: &mut Vec<u8>) -> io::Result<usize> {
        loop {
            match self.expected {
                None => {
                    let n = src.read(&mut self.header[self.header_len..])?;
                    if n == 0 {
                        return Ok(0);
                    }
                    self.header_len += n;
                    if self.header_len < self.header.len() {
                        continue;
                    }
                    self.header_len = 0;
                    let len = usize::from(u16::from_le_bytes(self.header));
                    debug!(len, "packet data record");
                    if len > 0 {
                        self.record.clear();
                        self.expected = Some(len);
                    }
                }
                Some(len) => {
                    let mut chunk = [0u8; READ_CHUNK_SIZE];
                    let want = (len - self.record.len()).min(chunk.len());
                    let n = src.read(&mut chunk[..want])?;
                    if n == 0 {
                        return Ok(0);
                    }
                    self.record.extend_from_slice(&chunk[..n]);
                    if self.record.len() == len {
                        self.expected = None;
                        out.append(&mut self.record);
                        return Ok(len);
                    }
                }
            }
        }
    }
}

/// Pseudo-terminal endpoints, optionally published as
/// `<link_dir>/gsmux<dlci>`.
#[cfg(unix)]
#[derive(Debug, Clone, Default)]
pub struct PtyEndpoints {
    link_dir: Option<PathBuf>,
}

#[cfg(unix)]
impl PtyEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.link_dir = Some(dir.into());
        self
    }

    /// Link path published for `dlci`, if a link directory is set.
    pub fn link_path(&self, dlci: u8) -> Option<PathBuf> {
        self.link_dir
            .as_ref()
            .map(|dir| dir.join(format!("gsmux{dlci}")))
    }
}

#[cfg(unix)]
impl EndpointFactory for PtyEndpoints {
    fn open(&self, dlci: u8) -> Result<Endpoint> {
        let mut pty = gsmux_transport::Pty::open()?;
        if let Some(link) = self.link_path(dlci) {
            pty.publish_link(link)?;
        }
        let name = pty
            .link()
            .unwrap_or_else(|| pty.slave_path())
            .display()
            .to_string();
        let reader = pty.stream()?;
        let writer = pty.stream()?;
        Ok(Endpoint::new(name, reader, writer).with_guard(pty))
    }
}

/// Endpoints backed by socket pairs. The far end of each pair is kept
/// until claimed with [`SocketEndpoints::take`]; used by emulators and
/// tests in place of pseudo-terminals.
#[cfg(unix)]
#[derive(Debug)]
pub struct SocketEndpoints {
    peers: std::sync::Mutex<std::collections::HashMap<u8, std::os::unix::net::UnixStream>>,
    read_timeout: Duration,
}

#[cfg(unix)]
impl SocketEndpoints {
    pub fn new() -> Self {
        Self {
            peers: std::sync::Mutex::new(std::collections::HashMap::new()),
            read_timeout: Duration::from_millis(100),
        }
    }

    /// Claim the application end for `dlci`.
    pub fn take(&self, dlci: u8) -> Option<std::os::unix::net::UnixStream> {
        self.peers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&dlci)
    }
}

#[cfg(unix)]
impl Default for SocketEndpoints {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl EndpointFactory for SocketEndpoints {
    fn open(&self, dlci: u8) -> Result<Endpoint> {
        let (ours, theirs) = std::os::unix::net::UnixStream::pair()?;
        ours.set_read_timeout(Some(self.read_timeout))?;
        let reader = ours.try_clone()?;
        self.peers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(dlci, theirs);
        Ok(Endpoint::new(format!("socket:{dlci}"), reader, ours))
    }
}
