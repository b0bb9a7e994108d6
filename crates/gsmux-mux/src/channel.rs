//! Per-DLCI connection state and the SABM/UA/DM/DISC handshake.

use std::sync::{Mutex, MutexGuard, PoisonError};

use gsmux_frame::FrameType;
use serde::Serialize;

use crate::endpoint::EndpointSink;
use crate::flow::FlowControl;

/// Most application bytes held for a channel that cannot transmit yet.
pub const MAX_PENDING: usize = 64 * 1024;

/// Connection state of one DLCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Closed,
    /// SABM sent, waiting for UA.
    AwaitingAck,
    Open,
    /// DISC sent, waiting for UA.
    AwaitingDiscAck,
}

/// Outcome of a handshake frame from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Channel became open.
    Opened,
    /// Open channel was closed by the peer.
    Closed,
    /// Peer answered our SABM with DM.
    Refused,
    /// Peer acknowledged our DISC.
    DiscAcked,
    /// UA for a channel that is already open.
    Duplicate,
    /// UA or DM nobody asked for.
    Stray,
    /// DISC for a channel that is not open; answered with DM.
    NotOpen,
}

/// State change and reply for one handshake frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub next: ChannelState,
    /// Frame to send back (with P/F set), if any.
    pub reply: Option<FrameType>,
    pub event: HandshakeEvent,
}

impl ChannelState {
    pub fn name(self) -> &'static str {
        match self {
            ChannelState::Closed => "closed",
            ChannelState::AwaitingAck => "awaiting_ack",
            ChannelState::Open => "open",
            ChannelState::AwaitingDiscAck => "awaiting_disc_ack",
        }
    }

    /// Transition for a SABM, UA, DM or DISC received from the peer.
    /// Information frames leave the state unchanged.
    pub fn on_peer_frame(self, frame_type: FrameType) -> Handshake {
        use ChannelState::*;
        use HandshakeEvent as E;

        let (next, reply, event) = match (frame_type, self) {
            (FrameType::Sabm, Open) => (Open, Some(FrameType::Ua), E::Duplicate),
            (FrameType::Sabm, _) => (Open, Some(FrameType::Ua), E::Opened),

            (FrameType::Ua, AwaitingAck) => (Open, None, E::Opened),
            (FrameType::Ua, AwaitingDiscAck) => (Closed, None, E::DiscAcked),
            (FrameType::Ua, Open) => (Open, None, E::Duplicate),
            (FrameType::Ua, Closed) => (Closed, None, E::Stray),

            (FrameType::Dm, AwaitingAck) => (Closed, None, E::Refused),
            (FrameType::Dm, Open) => (Closed, None, E::Closed),
            (FrameType::Dm, AwaitingDiscAck) => (Closed, None, E::DiscAcked),
            (FrameType::Dm, Closed) => (Closed, None, E::Stray),

            (FrameType::Disc, Open | AwaitingDiscAck) => (Closed, Some(FrameType::Ua), E::Closed),
            (FrameType::Disc, state) => (state, Some(FrameType::Dm), E::NotOpen),

            (FrameType::Uih | FrameType::Ui, state) => (state, None, E::Stray),
        };
        Handshake { next, reply, event }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) struct Slot {
    pub state: ChannelState,
    /// V.24 signals the host advertises on this channel.
    pub v24: u8,
    /// Application bytes not yet carried in a frame.
    pub pending: Vec<u8>,
    /// The application side dropped; the watchdog allocates a new endpoint.
    pub reopen: bool,
    pub endpoint: Option<EndpointSink>,
}

/// One logical channel.
pub(crate) struct Channel {
    pub dlci: u8,
    pub flow: FlowControl,
    slot: Mutex<Slot>,
}

impl Channel {
    pub fn new(dlci: u8) -> Self {
        Self {
            dlci,
            flow: FlowControl::new(),
            slot: Mutex::new(Slot {
                state: ChannelState::Closed,
                v24: 0,
                pending: Vec::new(),
                reopen: false,
                endpoint: None,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    pub fn set_state(&self, state: ChannelState) {
        self.lock().state = state;
    }

    /// Apply a handshake frame from the peer.
    pub fn peer_frame(&self, frame_type: FrameType) -> Handshake {
        let mut slot = self.lock();
        let step = slot.state.on_peer_frame(frame_type);
        slot.state = step.next;
        drop(slot);
        if step.next == ChannelState::Closed && step.event != HandshakeEvent::Stray {
            self.flow.reset();
        }
        step
    }

    /// Take the bytes waiting to be sent.
    pub fn take_pending(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().pending)
    }

    /// Keep unsent bytes for the next attempt. Returns how many bytes did
    /// not fit under [`MAX_PENDING`].
    pub fn keep_pending(&self, bytes: &[u8]) -> usize {
        let mut slot = self.lock();
        let room = MAX_PENDING.saturating_sub(slot.pending.len());
        let kept = bytes.len().min(room);
        slot.pending.extend_from_slice(&bytes[..kept]);
        bytes.len() - kept
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop protocol and endpoint state, as when the link goes down.
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.state = ChannelState::Closed;
        slot.v24 = 0;
        slot.pending.clear();
        slot.reopen = false;
        slot.endpoint = None;
        drop(slot);
        self.flow.reset();
    }
}
