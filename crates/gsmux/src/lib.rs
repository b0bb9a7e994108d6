//! GSM 07.10 serial multiplexer.
//!
//! gsmux runs the host side of the 3GPP TS 27.010 multiplexer protocol:
//! one serial link to a modem carries up to 31 logical channels, each
//! exposed to applications as its own pseudo-terminal.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial link, unix socket link, pseudo-terminals
//! - [`frame`]: frame codec (basic and advanced modes), CRC-8, ring buffer
//! - [`mux`]: channel state machine, control channel, AT negotiation and
//!   the link watchdog

/// Re-export transport types.
pub mod transport {
    pub use gsmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gsmux_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use gsmux_mux::*;
}
