//! Receive path: link reader, frame assembler and frame dispatch.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gsmux_frame::dump::trace_dump;
use gsmux_frame::{Frame, FrameDecoder, FrameType, CONTROL_DLCI};
use gsmux_transport::{is_idle, LinkStream};
use tracing::{debug, error, info, trace, warn};

use crate::channel::{ChannelState, HandshakeEvent};
use crate::control::{react, CommandType, ControlEvent, ControlMessage};
use crate::mux::Mux;

const SPACE_WAIT: Duration = Duration::from_millis(100);

impl Mux {
    /// Body of the link reader thread: physical link bytes into the ring.
    pub(crate) fn run_link_reader(&self, mut link: LinkStream, stop: &AtomicBool) {
        let mut buf = vec![0u8; self.ring.capacity()];
        while !stop.load(Ordering::Acquire) {
            let free = self.ring.free_space();
            if free == 0 {
                warn!("receive buffer full; waiting for the assembler");
                self.ring.wait_for_space(SPACE_WAIT);
                continue;
            }

            match link.read(&mut buf[..free]) {
                Ok(0) => {
                    error!("physical link closed");
                    self.request_close();
                    break;
                }
                Ok(n) => {
                    trace_dump("<s ", &buf[..n]);
                    let stored = self.ring.write(&buf[..n]);
                    if stored < n {
                        warn!(lost = n - stored, "receive buffer overflow");
                    }
                }
                Err(err) if is_idle(&err) => {}
                Err(err) => {
                    error!(%err, "physical link read failed");
                    self.request_close();
                    break;
                }
            }
        }
        debug!("link reader stopped");
    }

    /// Body of the assembler thread: decode buffered bytes and dispatch.
    pub(crate) fn run_assembler(&self, stop: &AtomicBool) {
        let mut decoder = FrameDecoder::new(self.frame_config().clone());
        while !stop.load(Ordering::Acquire) {
            self.ring.wait_for_data(self.config().assembler_wait);
            while let Some(frame) = self.ring.decode_next(&mut decoder) {
                self.dispatch(frame);
                if stop.load(Ordering::Acquire) {
                    break;
                }
            }
        }
        debug!("assembler stopped");
    }

    /// Route one decoded frame.
    pub fn dispatch(&self, frame: Frame) {
        self.touch();
        let Some(frame_type) = frame.frame_type() else {
            warn!(dlci = frame.dlci, control = frame.control, "unknown frame type");
            return;
        };
        trace!(dlci = frame.dlci, frame_type = %frame_type, len = frame.payload.len(), "frame");

        if frame_type.is_information() {
            if frame.dlci == CONTROL_DLCI {
                self.handle_control(&frame);
            } else {
                self.deliver(&frame);
            }
            return;
        }

        let Ok(channel) = self.channel(frame.dlci) else {
            warn!(dlci = frame.dlci, "frame for unknown channel");
            return;
        };
        let handshake = channel.peer_frame(frame_type);
        match handshake.event {
            HandshakeEvent::Opened => info!(dlci = frame.dlci, "logical channel opened"),
            HandshakeEvent::Closed => {
                info!(dlci = frame.dlci, "logical channel closed by the modem");
                if frame.dlci == CONTROL_DLCI {
                    self.request_close();
                }
            }
            HandshakeEvent::Refused => {
                warn!(dlci = frame.dlci, "modem refused to open channel");
                if frame.dlci == CONTROL_DLCI {
                    self.request_close();
                }
            }
            HandshakeEvent::DiscAcked => info!(dlci = frame.dlci, "logical channel disconnected"),
            HandshakeEvent::Duplicate => debug!(dlci = frame.dlci, frame_type = %frame_type, "duplicate handshake"),
            HandshakeEvent::Stray => debug!(dlci = frame.dlci, frame_type = %frame_type, "unsolicited frame ignored"),
            HandshakeEvent::NotOpen => debug!(dlci = frame.dlci, "DISC for a channel that is not open"),
        }

        if let Some(reply) = handshake.reply {
            if let Err(err) = self.send_frame(frame.dlci, reply.with_pf(), &[]) {
                warn!(dlci = frame.dlci, %err, "failed to answer handshake");
            }
        }
    }

    /// Hand a data frame to the channel's application, or echo it in loop
    /// test mode.
    fn deliver(&self, frame: &Frame) {
        if self.config().loop_test {
            if let Err(err) = self.send_frame(frame.dlci, frame.control, &frame.payload) {
                warn!(dlci = frame.dlci, %err, "loop test echo failed");
            }
            return;
        }

        let Ok(channel) = self.channel(frame.dlci) else {
            warn!(dlci = frame.dlci, "data for unknown channel");
            return;
        };
        let mut slot = channel.lock();
        if slot.state != ChannelState::Open {
            debug!(dlci = frame.dlci, state = %slot.state, len = frame.payload.len(), "data for a channel that is not open dropped");
            return;
        }
        let Some(sink) = slot.endpoint.as_mut() else {
            debug!(dlci = frame.dlci, len = frame.payload.len(), "no application attached; data dropped");
            return;
        };
        let written = sink
            .writer
            .write_all(&frame.payload)
            .and_then(|()| sink.writer.flush());
        if let Err(err) = written {
            warn!(dlci = frame.dlci, endpoint = %sink.name, %err, "failed to deliver data to application");
        }
    }

    fn handle_control(&self, frame: &Frame) {
        let Some(msg) = ControlMessage::parse(&frame.payload) else {
            warn!(len = frame.payload.len(), "malformed control message");
            return;
        };
        debug!(
            command = msg.kind().map_or("unknown", CommandType::name),
            is_command = msg.is_command(),
            "control message"
        );

        // MSC answers mirror the P/F bit of the frame they reply to.
        let control = if msg.kind() == Some(CommandType::Msc) && frame.poll_final() {
            FrameType::Uih.with_pf()
        } else {
            FrameType::Uih.control()
        };

        let reaction = react(&msg);
        if let Some(reply) = &reaction.reply {
            if let Err(err) = self.send_control(reply, control) {
                warn!(%err, "failed to answer control message");
            }
        }

        match reaction.event {
            ControlEvent::None | ControlEvent::Acknowledged(_) => {}
            ControlEvent::CloseDown => self.request_close(),
            ControlEvent::ModemStatus { dlci, signals } => {
                self.apply_modem_status(dlci, signals, control)
            }
            ControlEvent::TestReply(_) => {
                self.probes.store(0, Ordering::Release);
                debug!("keep-alive answered");
            }
            ControlEvent::Rejected(_) => {}
        }
    }

    fn apply_modem_status(&self, dlci: u8, signals: u8, control: u8) {
        let Ok(channel) = self.channel(dlci) else {
            warn!(dlci, "modem status for unknown channel");
            return;
        };
        if signals & crate::control::SIGNAL_FC != 0 {
            info!(dlci, "modem stopped the flow");
            channel.flow.stop();
        } else {
            if channel.flow.is_stopped() {
                info!(dlci, "modem resumed the flow");
            }
            channel.flow.resume();
        }

        let v24 = channel.lock().v24;
        let status = ControlMessage::modem_status(dlci, v24, true);
        if let Err(err) = self.send_control(&status, control) {
            warn!(dlci, %err, "failed to send modem status");
        }
    }
}
