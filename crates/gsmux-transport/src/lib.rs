//! Physical link and channel endpoint abstraction for gsmux.
//!
//! Provides the byte streams the multiplexer sits between:
//! - the physical link to the modem (serial port, or a unix socket when the
//!   modem is emulated)
//! - pseudo-terminal endpoints exposed to applications, one per logical
//!   channel (Unix only)
//!
//! This is the lowest layer of gsmux. Everything else builds on top of
//! the [`LinkStream`] type provided here.

pub mod error;
pub mod serial;
pub mod traits;

#[cfg(unix)]
pub mod pty;

pub use error::{is_idle, Result, TransportError};
pub use serial::{baud_rate_index, open_serial, SerialConfig, BAUD_RATES};
pub use traits::LinkStream;

#[cfg(unix)]
pub use pty::{Pty, PtyStream};
