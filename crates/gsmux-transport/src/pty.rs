use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// Default poll timeout for endpoint reads.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// A pseudo-terminal pair. The multiplexer keeps the master side; an
/// application opens [`Pty::slave_path`] and sees a plain raw tty.
#[derive(Debug)]
pub struct Pty {
    master: File,
    slave_path: PathBuf,
    link: Option<PathBuf>,
}

impl Pty {
    /// Allocate a new pseudo-terminal in raw mode with a non-blocking master.
    pub fn open() -> Result<Self> {
        // SAFETY: posix_openpt has no pointer arguments; the result is checked below.
        let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        if fd < 0 {
            return Err(TransportError::Pty(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by posix_openpt and nothing else owns it.
        let master = unsafe { File::from_raw_fd(fd) };

        // SAFETY: `fd` is an open pty master owned by `master`.
        if unsafe { libc::grantpt(fd) } != 0 || unsafe { libc::unlockpt(fd) } != 0 {
            return Err(TransportError::Pty(std::io::Error::last_os_error()));
        }

        let slave_path = slave_name(fd)?;
        set_raw(fd)?;
        set_nonblocking(fd)?;

        debug!(slave = ?slave_path, "allocated pseudo-terminal");
        Ok(Self {
            master,
            slave_path,
            link: None,
        })
    }

    /// Path of the slave device applications open.
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Published symlink, if any.
    pub fn link(&self) -> Option<&Path> {
        self.link.as_deref()
    }

    /// Publish a stable symlink to the slave device. A stale link at `path`
    /// is replaced.
    pub fn publish_link(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_symlink() {
                let _ = std::fs::remove_file(path);
            }
        }
        std::os::unix::fs::symlink(&self.slave_path, path).map_err(|source| {
            TransportError::Link {
                link: path.to_path_buf(),
                target: self.slave_path.clone(),
                source,
            }
        })?;
        info!(link = ?path, slave = ?self.slave_path, "published endpoint link");
        self.link = Some(path.to_path_buf());
        Ok(())
    }

    /// A duplex stream over the master side. May be called more than once,
    /// e.g. to give the reading and writing threads their own handles.
    pub fn stream(&self) -> Result<PtyStream> {
        Ok(PtyStream {
            file: self.master.try_clone()?,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            attached: false,
        })
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            match std::fs::read_link(&link) {
                Ok(target) if target == self.slave_path => {
                    debug!(link = ?link, "removing endpoint link");
                    let _ = std::fs::remove_file(&link);
                }
                _ => {
                    debug!(link = ?link, "endpoint link changed; skipping cleanup");
                }
            }
        }
    }
}

/// Master side of a [`Pty`].
///
/// Reads poll with a timeout and report idle errors (see [`crate::is_idle`])
/// when nothing arrived. Once an application has attached to the slave,
/// its hangup is reported as end of stream (`Ok(0)`), the same way a
/// closed socket peer is.
#[derive(Debug)]
pub struct PtyStream {
    file: File,
    poll_timeout: Duration,
    attached: bool,
}

impl PtyStream {
    /// Set the poll timeout used by reads.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.poll_timeout = timeout;
    }

    /// Clone the handle for use on another thread.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            poll_timeout: self.poll_timeout,
            attached: self.attached,
        })
    }

    fn hangup(&mut self) -> std::io::Result<usize> {
        if self.attached {
            debug!("pty slave hung up");
            return Ok(0);
        }
        // Nobody has opened the slave yet. Pace the caller instead of
        // spinning on a permanently hung-up descriptor.
        std::thread::sleep(self.poll_timeout);
        Err(ErrorKind::WouldBlock.into())
    }
}

impl Read for PtyStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = self.poll_timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: `pfd` is a valid pollfd for the duration of the call and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if rc == 0 {
            // A pty master only times out while a slave is open.
            self.attached = true;
            return Err(ErrorKind::WouldBlock.into());
        }

        if pfd.revents & libc::POLLIN != 0 {
            match self.file.read(buf) {
                Ok(n) => {
                    self.attached = true;
                    Ok(n)
                }
                // Linux reports a closed slave as EIO.
                Err(err) if err.raw_os_error() == Some(libc::EIO) => self.hangup(),
                Err(err) => Err(err),
            }
        } else if pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
            self.hangup()
        } else {
            warn!(revents = pfd.revents, "unexpected pty poll result");
            Err(ErrorKind::WouldBlock.into())
        }
    }
}

impl Write for PtyStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

#[cfg(target_os = "linux")]
fn slave_name(fd: libc::c_int) -> Result<PathBuf> {
    let mut buf = [0 as libc::c_char; 128];
    // SAFETY: `buf` is writable for `buf.len()` bytes and ptsname_r NUL-terminates on success.
    let rc = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(TransportError::Pty(std::io::Error::from_raw_os_error(rc)));
    }
    // SAFETY: ptsname_r succeeded, so `buf` holds a NUL-terminated string.
    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

#[cfg(not(target_os = "linux"))]
fn slave_name(fd: libc::c_int) -> Result<PathBuf> {
    // SAFETY: `fd` is an open pty master; the returned pointer is copied before
    // any other ptsname call can overwrite it on this thread.
    let ptr = unsafe { libc::ptsname(fd) };
    if ptr.is_null() {
        return Err(TransportError::Pty(std::io::Error::last_os_error()));
    }
    // SAFETY: non-null ptsname results point to a NUL-terminated string.
    let name = unsafe { std::ffi::CStr::from_ptr(ptr) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

fn set_raw(fd: libc::c_int) -> Result<()> {
    let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `term` is a valid out-pointer for one termios struct.
    if unsafe { libc::tcgetattr(fd, term.as_mut_ptr()) } != 0 {
        return Err(TransportError::Pty(std::io::Error::last_os_error()));
    }
    // SAFETY: tcgetattr succeeded and fully initialized `term`.
    let mut term = unsafe { term.assume_init() };
    term.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
    term.c_iflag &= !(libc::INLCR | libc::ICRNL | libc::IGNCR);
    term.c_oflag &= !(libc::OPOST | libc::ONLRET | libc::ONOCR | libc::OCRNL);
    // SAFETY: `term` is an initialized termios and `fd` is an open tty descriptor.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
        return Err(TransportError::Pty(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn set_nonblocking(fd: libc::c_int) -> Result<()> {
    // SAFETY: fcntl on an open descriptor with integer arguments only.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(TransportError::Pty(std::io::Error::last_os_error()));
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(TransportError::Pty(std::io::Error::last_os_error()));
    }
    Ok(())
}
