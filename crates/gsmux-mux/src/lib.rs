//! GSM 07.10 multiplexer engine.
//!
//! This is the layer that turns one serial link into many channels:
//! - [`Mux`] holds the channel table and the shared frame writer
//! - the assembler threads decode link bytes and dispatch frames
//! - [`Watchdog`] brings the link up, negotiates mux mode over AT
//!   commands and resets the link on any fault
//!
//! Each logical channel is backed by an application [`Endpoint`]
//! (a pseudo-terminal by default).

mod assembler;
pub mod at;
pub mod channel;
pub mod config;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod flow;
pub mod link;
pub mod mux;
pub mod stats;
pub mod watchdog;

pub use at::{chat, negotiate};
pub use channel::{ChannelState, Handshake, HandshakeEvent, MAX_PENDING};
pub use config::{AtTimeouts, MuxConfig};
pub use control::{react, CommandType, ControlEvent, ControlMessage, Reaction, HOST_SIGNALS};
#[cfg(unix)]
pub use endpoint::{PtyEndpoints, SocketEndpoints};
pub use endpoint::{ChannelReader, Endpoint, EndpointFactory, FramingPolicy};
pub use error::{MuxError, Result};
pub use flow::FlowControl;
#[cfg(unix)]
pub use link::UnixLink;
pub use link::{LinkProvider, SerialLink};
pub use mux::{LinkState, Mux};
pub use stats::{ChannelStats, MuxStats};
pub use watchdog::Watchdog;
