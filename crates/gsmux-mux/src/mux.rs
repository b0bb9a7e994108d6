//! Shared multiplexer context.
//!
//! One [`Mux`] is shared (behind an `Arc`) by the watchdog, the link reader,
//! the frame assembler and one thread per logical channel. All frames go
//! out through a single mutex-guarded [`FrameWriter`], so frames from
//! different channels never interleave on the wire.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gsmux_frame::{FrameConfig, FrameType, FrameWriter, Mode, RingBuffer, CONTROL_DLCI, MAX_CHANNELS};
use gsmux_transport::{is_idle, LinkStream};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelState};
use crate::config::MuxConfig;
use crate::control::{CommandType, ControlMessage, HOST_SIGNALS};
use crate::endpoint::{ChannelReader, EndpointFactory, READ_CHUNK_SIZE};
use crate::error::{MuxError, Result};
use crate::stats::{ChannelStats, MuxStats};

/// Lifecycle of the physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Waiting to (re)open the physical link.
    Opening,
    /// Link open, AT negotiation in progress.
    Initializing,
    Muxing,
    /// Tear down on the next watchdog tick.
    Closing,
    /// Shut down for good.
    Off,
}

impl LinkState {
    pub fn name(self) -> &'static str {
        match self {
            LinkState::Opening => "opening",
            LinkState::Initializing => "initializing",
            LinkState::Muxing => "muxing",
            LinkState::Closing => "closing",
            LinkState::Off => "off",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

struct Session {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

/// The multiplexer: link state, channel table and the shared write path.
pub struct Mux {
    config: MuxConfig,
    endpoints: Arc<dyn EndpointFactory>,
    state: Mutex<LinkState>,
    pub(crate) channels: Vec<Channel>,
    writer: Mutex<Option<FrameWriter<LinkStream>>>,
    pub(crate) ring: RingBuffer,
    session: Mutex<Option<Session>>,
    pub(crate) probes: AtomicU32,
    last_frame: Mutex<Instant>,
    fatal: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Join threads that already exited (channel threads end whenever an
/// application drops its endpoint).
fn reap_finished(threads: &mut Vec<JoinHandle<()>>) {
    let mut i = 0;
    while i < threads.len() {
        if !threads[i].is_finished() {
            i += 1;
            continue;
        }
        let handle = threads.swap_remove(i);
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            error!(thread = %name, "session thread panicked");
        }
    }
}

impl Mux {
    /// Create an idle multiplexer in the Opening state.
    pub fn new(mut config: MuxConfig, endpoints: Arc<dyn EndpointFactory>) -> Result<Arc<Self>> {
        config.validate()?;
        config.frame.max_dlci = config.channels;

        Ok(Arc::new(Self {
            channels: (0..MAX_CHANNELS as u8).map(Channel::new).collect(),
            config,
            endpoints,
            state: Mutex::new(LinkState::Opening),
            writer: Mutex::new(None),
            ring: RingBuffer::new(),
            session: Mutex::new(None),
            probes: AtomicU32::new(0),
            last_frame: Mutex::new(Instant::now()),
            fatal: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn frame_config(&self) -> &FrameConfig {
        &self.config.frame
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: LinkState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!(from = %*current, to = %state, "link state");
            *current = state;
        }
    }

    /// Move a live link to Closing. The watchdog tears it down on its next
    /// tick. No effect while opening or after shutdown.
    pub fn request_close(&self) {
        let mut current = lock(&self.state);
        if matches!(*current, LinkState::Initializing | LinkState::Muxing) {
            info!(from = %*current, "link closing requested");
            *current = LinkState::Closing;
        }
    }

    /// Reason the multiplexer cannot continue, if any.
    pub fn fatal(&self) -> Option<String> {
        lock(&self.fatal).clone()
    }

    pub(crate) fn set_fatal(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(%reason, "fatal multiplexer condition");
        lock(&self.fatal).get_or_insert(reason);
    }

    pub(crate) fn channel(&self, dlci: u8) -> Result<&Channel> {
        self.channels
            .get(usize::from(dlci))
            .ok_or(MuxError::UnknownChannel(dlci))
    }

    pub fn channel_state(&self, dlci: u8) -> Option<ChannelState> {
        self.channels.get(usize::from(dlci)).map(Channel::state)
    }

    /// Application-facing name of the channel's endpoint.
    pub fn endpoint_name(&self, dlci: u8) -> Option<String> {
        let channel = self.channels.get(usize::from(dlci))?;
        let slot = channel.lock();
        slot.endpoint.as_ref().map(|sink| sink.name.clone())
    }

    pub fn is_flow_stopped(&self, dlci: u8) -> bool {
        self.channels
            .get(usize::from(dlci))
            .is_some_and(|channel| channel.flow.is_stopped())
    }

    /// Keep-alive probes sent since the last TEST reply.
    pub fn unanswered_probes(&self) -> u32 {
        self.probes.load(Ordering::Acquire)
    }

    /// Time since the last frame arrived.
    pub fn idle_for(&self) -> Duration {
        lock(&self.last_frame).elapsed()
    }

    pub(crate) fn touch(&self) {
        *lock(&self.last_frame) = Instant::now();
    }

    fn session_stop(&self) -> Option<Arc<AtomicBool>> {
        lock(&self.session).as_ref().map(|s| Arc::clone(&s.stop))
    }

    fn spawn(&self, name: String, body: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| MuxError::ThreadSpawn { name, source })?;
        if let Some(session) = lock(&self.session).as_mut() {
            reap_finished(&mut session.threads);
            session.threads.push(handle);
        }
        Ok(())
    }

    /// Encode and write one frame on the shared link. Returns the payload
    /// bytes carried, capped at the frame size.
    pub fn send_frame(&self, dlci: u8, control: u8, payload: &[u8]) -> Result<usize> {
        let mut writer = lock(&self.writer);
        let writer = writer.as_mut().ok_or(MuxError::Disconnected)?;
        Ok(writer.send(dlci, control, payload)?)
    }

    /// Send a control message on DLCI 0.
    pub fn send_control(&self, msg: &ControlMessage, control: u8) -> Result<()> {
        self.send_frame(CONTROL_DLCI, control, &msg.encode())?;
        Ok(())
    }

    /// Forward application bytes on `dlci`.
    ///
    /// Bytes are split into frame-sized chunks. Each chunk waits for the
    /// channel's flow gate. Bytes that cannot be sent (channel not open
    /// yet, or the link stalled for `write_retries` attempts) are held and
    /// go out in front of the next write. A channel that is not open gets
    /// a SABM first.
    pub fn send_data(&self, dlci: u8, data: &[u8]) -> Result<usize> {
        let channel = self.channel(dlci)?;
        let mut pending = channel.take_pending();
        pending.extend_from_slice(data);
        if pending.is_empty() {
            return Ok(0);
        }

        let state = channel.state();
        if state != ChannelState::Open {
            if state == ChannelState::Closed {
                warn!(dlci, "write to a channel that is not open; sending SABM");
                channel.set_state(ChannelState::AwaitingAck);
                if let Err(err) = self.send_frame(dlci, FrameType::Sabm.with_pf(), &[]) {
                    channel.set_state(ChannelState::Closed);
                    self.hold(channel, &pending);
                    return Err(err);
                }
            }
            self.hold(channel, &pending);
            return Ok(0);
        }

        let Some(stop) = self.session_stop() else {
            self.hold(channel, &pending);
            return Err(MuxError::Disconnected);
        };

        let mut written = 0;
        let mut stalls = 0;
        let mut last_err = None;
        while written < pending.len() && stalls < self.config.write_retries {
            if !channel.flow.wait_if_stopped(&stop) {
                break;
            }
            match self.send_frame(dlci, FrameType::Uih.control(), &pending[written..]) {
                Ok(0) => stalls += 1,
                Ok(n) => written += n,
                Err(err) => {
                    stalls += 1;
                    last_err = Some(err);
                }
            }
        }

        if written < pending.len() {
            warn!(
                dlci,
                written,
                total = pending.len(),
                "could not write all data to the link"
            );
            self.hold(channel, &pending[written..]);
            if let Some(err) = last_err {
                if matches!(err, MuxError::Frame(_)) {
                    self.request_close();
                }
                return Err(err);
            }
        }
        Ok(written)
    }

    fn hold(&self, channel: &Channel, bytes: &[u8]) {
        let dropped = channel.keep_pending(bytes);
        if dropped > 0 {
            warn!(dlci = channel.dlci, dropped, "pending buffer full; dropping application data");
        }
    }

    /// Bring up a session on a negotiated link: start the reader and
    /// assembler threads, open the control channel, then allocate an
    /// endpoint and send SABM for every configured channel.
    pub fn start_session(self: &Arc<Self>, mut link: LinkStream) -> Result<()> {
        self.stop_session();

        link.set_read_timeout(self.config.link_read_timeout)?;
        let reader = link.try_clone()?;

        self.ring.clear();
        for channel in &self.channels {
            channel.reset();
        }
        self.probes.store(0, Ordering::Release);
        self.touch();

        *lock(&self.writer) = Some(FrameWriter::with_config(link, self.config.frame.clone()));
        let stop = Arc::new(AtomicBool::new(false));
        *lock(&self.session) = Some(Session {
            stop: Arc::clone(&stop),
            threads: Vec::new(),
        });
        self.set_state(LinkState::Muxing);

        {
            let mux = Arc::clone(self);
            let stop = Arc::clone(&stop);
            self.spawn("gsmux-assembler".to_string(), move || {
                mux.run_assembler(&stop)
            })?;
        }
        {
            let mux = Arc::clone(self);
            let stop = Arc::clone(&stop);
            self.spawn("gsmux-link-reader".to_string(), move || {
                mux.run_link_reader(reader, &stop)
            })?;
        }

        self.channels[usize::from(CONTROL_DLCI)].set_state(ChannelState::AwaitingAck);
        self.send_frame(CONTROL_DLCI, FrameType::Sabm.with_pf(), &[])?;

        for dlci in 1..=self.config.channels {
            info!(dlci, total = self.config.channels, "allocating logical channel");
            self.open_channel(dlci)?;
            if !self.config.channel_open_delay.is_zero() {
                thread::sleep(self.config.channel_open_delay);
            }
        }
        info!("multiplexing started");
        Ok(())
    }

    /// Attach an endpoint to `dlci` and ask the modem to open it.
    pub fn open_channel(self: &Arc<Self>, dlci: u8) -> Result<()> {
        if dlci == CONTROL_DLCI {
            return Err(MuxError::UnknownChannel(dlci));
        }
        let channel = self.channel(dlci)?;
        let stop = self.session_stop().ok_or(MuxError::Disconnected)?;

        let name = self.attach_endpoint(dlci, &stop)?;
        channel.set_state(ChannelState::AwaitingAck);
        self.send_frame(dlci, FrameType::Sabm.with_pf(), &[])?;
        info!(dlci, endpoint = %name, "connecting endpoint to channel");
        Ok(())
    }

    fn attach_endpoint(self: &Arc<Self>, dlci: u8, stop: &Arc<AtomicBool>) -> Result<String> {
        let channel = self.channel(dlci)?;
        let endpoint = self
            .endpoints
            .open(dlci)
            .map_err(|err| MuxError::Endpoint {
                dlci,
                reason: err.to_string(),
            })?;
        let (reader, sink) = endpoint.split();
        let name = sink.name.clone();
        {
            let mut slot = channel.lock();
            slot.endpoint = Some(sink);
            slot.v24 = HOST_SIGNALS;
            slot.reopen = false;
        }

        let framing = self.config.framing(dlci).reader();
        let mux = Arc::clone(self);
        let stop = Arc::clone(stop);
        self.spawn(format!("gsmux-ch{dlci}"), move || {
            mux.run_channel(dlci, reader, framing, &stop)
        })?;
        Ok(name)
    }

    fn detach_endpoint(&self, dlci: u8) {
        if let Ok(channel) = self.channel(dlci) {
            let mut slot = channel.lock();
            slot.endpoint = None;
            slot.reopen = true;
        }
    }

    /// Body of a channel thread: application bytes in, frames out.
    fn run_channel(
        &self,
        dlci: u8,
        mut reader: Box<dyn Read + Send>,
        mut framing: Box<dyn ChannelReader>,
        stop: &AtomicBool,
    ) {
        let mut record = Vec::with_capacity(READ_CHUNK_SIZE);
        while !stop.load(Ordering::Acquire) {
            record.clear();
            match framing.read_record(reader.as_mut(), &mut record) {
                Ok(0) => {
                    info!(dlci, "application dropped connection; endpoint will be reopened");
                    self.detach_endpoint(dlci);
                    return;
                }
                Ok(len) => {
                    debug!(dlci, len, "data from application");
                    if let Err(err) = self.send_data(dlci, &record) {
                        warn!(dlci, %err, "failed to forward application data");
                    }
                }
                Err(err) if is_idle(&err) => {
                    let flush = self.channel(dlci).is_ok_and(|channel| {
                        channel.state() == ChannelState::Open && channel.pending_len() > 0
                    });
                    if flush {
                        if let Err(err) = self.send_data(dlci, &[]) {
                            debug!(dlci, %err, "pending data still held");
                        }
                    }
                }
                Err(err) => {
                    warn!(dlci, %err, "endpoint read failed; endpoint will be reopened");
                    self.detach_endpoint(dlci);
                    return;
                }
            }
        }
        debug!(dlci, "channel thread stopped");
    }

    /// Allocate fresh endpoints for channels whose application dropped.
    pub fn reopen_dropped(self: &Arc<Self>) -> Result<()> {
        let Some(stop) = self.session_stop() else {
            return Ok(());
        };
        for dlci in 1..=self.config.channels {
            let reopen = self.channel(dlci)?.lock().reopen;
            if reopen {
                let name = self.attach_endpoint(dlci, &stop)?;
                info!(dlci, endpoint = %name, "reopened endpoint");
            }
        }
        Ok(())
    }

    /// Ask the modem to close `dlci`. The channel closes when the UA
    /// arrives.
    pub fn close_channel(&self, dlci: u8) -> Result<()> {
        let channel = self.channel(dlci)?;
        if channel.state() != ChannelState::Open {
            debug!(dlci, state = %channel.state(), "close of a channel that is not open");
            return Ok(());
        }
        channel.set_state(ChannelState::AwaitingDiscAck);
        self.send_frame(dlci, FrameType::Disc.with_pf(), &[])?;
        Ok(())
    }

    /// Send a keep-alive TEST command and count it as unanswered.
    pub fn ping(&self) -> Result<()> {
        let sent = self.probes.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(probes = sent, "sending keep-alive probe");
        self.send_control(&ControlMessage::ping(), FrameType::Ui.control())
    }

    /// Send close-down frames for every open channel and the link, stop
    /// all session threads and release the link.
    pub fn close_session(&self) {
        if lock(&self.writer).is_some() {
            let cld = ControlMessage::command(CommandType::Cld, bytes::Bytes::new()).encode();
            for channel in &self.channels[1..] {
                if channel.state() != ChannelState::Open {
                    continue;
                }
                let dlci = channel.dlci;
                info!(dlci, "closing down logical channel");
                let sent = match self.config.frame.mode {
                    Mode::Advanced => self.send_frame(dlci, FrameType::Disc.with_pf(), &[]),
                    Mode::Basic => self.send_frame(dlci, FrameType::Uih.control(), &cld),
                };
                if let Err(err) = sent {
                    warn!(dlci, %err, "failed to send close-down");
                }
            }
            if let Err(err) = self.send_frame(CONTROL_DLCI, FrameType::Uih.control(), &cld) {
                warn!(%err, "failed to send mux close-down");
            }
        }

        self.stop_session();
        for channel in &self.channels {
            channel.reset();
        }
        self.ring.clear();
        self.set_state(LinkState::Off);
        info!("multiplexer session closed");
    }

    fn stop_session(&self) {
        let session = lock(&self.session).take();
        let link = lock(&self.writer).take();
        drop(link);

        if let Some(session) = session {
            session.stop.store(true, Ordering::Release);
            let current = thread::current().id();
            for handle in session.threads {
                if handle.thread().id() == current {
                    continue;
                }
                let name = handle.thread().name().unwrap_or("worker").to_string();
                if handle.join().is_err() {
                    error!(thread = %name, "session thread panicked");
                }
            }
        }
    }

    pub fn stats(&self) -> MuxStats {
        let ring = self.ring.stats();
        MuxStats {
            state: self.state(),
            buffered: ring.used,
            received: ring.received,
            dropped: ring.dropped,
            unanswered_probes: self.unanswered_probes(),
            idle_ms: self.idle_for().as_millis().min(u128::from(u64::MAX)) as u64,
            channels: self.channels[..=usize::from(self.config.channels)]
                .iter()
                .map(|channel| {
                    let slot = channel.lock();
                    ChannelStats {
                        dlci: channel.dlci,
                        state: slot.state,
                        endpoint: slot.endpoint.as_ref().map(|sink| sink.name.clone()),
                        flow_stopped: channel.flow.is_stopped(),
                        pending: slot.pending.len(),
                    }
                })
                .collect(),
        }
    }

    /// Install a writer without starting any threads.
    #[cfg(test)]
    pub(crate) fn attach_writer(&self, link: LinkStream) {
        *lock(&self.writer) = Some(FrameWriter::with_config(link, self.config.frame.clone()));
        *lock(&self.session) = Some(Session {
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        });
        self.set_state(LinkState::Muxing);
    }

    #[cfg(test)]
    pub(crate) fn session_threads(&self) -> usize {
        lock(&self.session).as_ref().map_or(0, |s| s.threads.len())
    }
}

impl std::fmt::Debug for Mux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mux")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
