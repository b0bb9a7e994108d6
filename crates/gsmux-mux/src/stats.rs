use serde::Serialize;

use crate::channel::ChannelState;
use crate::mux::LinkState;

/// Point-in-time view of a running multiplexer.
#[derive(Debug, Clone, Serialize)]
pub struct MuxStats {
    pub state: LinkState,
    /// Received bytes not yet decoded.
    pub buffered: usize,
    /// Frames decoded since the session started.
    pub received: u64,
    /// Corrupt frames dropped since the session started.
    pub dropped: u64,
    /// Keep-alive probes sent without a reply.
    pub unanswered_probes: u32,
    /// Milliseconds since the last frame arrived.
    pub idle_ms: u64,
    pub channels: Vec<ChannelStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub dlci: u8,
    pub state: ChannelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub flow_stopped: bool,
    /// Application bytes waiting for the channel to accept them.
    pub pending: usize,
}
