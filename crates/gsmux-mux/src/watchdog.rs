//! Link recovery state machine.
//!
//! The watchdog owns the physical link lifecycle:
//!
//! ```text
//! Opening -> Initializing -> Muxing -> Closing -> Opening -> ...
//! ```
//!
//! Every fault (AT failure, link EOF, close-down from the modem, missed
//! keep-alives, idle timeout) ends in Closing, and Closing always returns
//! to Opening. `Off` is only entered at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gsmux_transport::LinkStream;
use tracing::{debug, error, info, warn};

use crate::at::negotiate;
use crate::error::{MuxError, Result};
use crate::link::LinkProvider;
use crate::mux::{LinkState, Mux};

const SLEEP_STEP: Duration = Duration::from_millis(100);

pub struct Watchdog<L> {
    mux: Arc<Mux>,
    link: L,
    /// Link opened but not yet negotiated.
    pending: Option<LinkStream>,
}

impl<L: LinkProvider> Watchdog<L> {
    pub fn new(mux: Arc<Mux>, link: L) -> Self {
        Self {
            mux,
            link,
            pending: None,
        }
    }

    pub fn mux(&self) -> &Arc<Mux> {
        &self.mux
    }

    /// Run one step of the state machine.
    pub fn tick(&mut self) {
        match self.mux.state() {
            LinkState::Opening => {
                if self.open_link() {
                    self.initialize();
                }
            }
            LinkState::Initializing => self.initialize(),
            LinkState::Muxing => self.supervise(),
            LinkState::Closing => {
                self.pending = None;
                self.mux.close_session();
                self.mux.set_state(LinkState::Opening);
            }
            LinkState::Off => {}
        }
    }

    fn open_link(&mut self) -> bool {
        match self.link.open() {
            Ok(mut link) => {
                if let Err(err) = link.set_read_timeout(self.mux.config().link_read_timeout) {
                    warn!(link = %self.link.describe(), %err, "failed to configure link; retrying");
                    return false;
                }
                info!(link = %self.link.describe(), kind = link.kind(), "physical link open");
                self.pending = Some(link);
                self.mux.set_state(LinkState::Initializing);
                true
            }
            Err(err) => {
                warn!(link = %self.link.describe(), %err, "cannot open physical link; retrying");
                false
            }
        }
    }

    fn initialize(&mut self) {
        let Some(mut link) = self.pending.take() else {
            self.mux.set_state(LinkState::Opening);
            return;
        };

        if let Err(err) = negotiate(&mut link, self.mux.config()) {
            error!(%err, "mux negotiation failed");
            self.mux.set_state(LinkState::Closing);
            return;
        }

        if let Err(err) = self.mux.start_session(link) {
            self.fail(err);
        }
    }

    fn supervise(&mut self) {
        if let Err(err) = self.mux.reopen_dropped() {
            self.fail(err);
            return;
        }

        let config = self.mux.config();
        if config.ping_probes > 0 {
            if self.mux.unanswered_probes() >= config.ping_probes {
                error!(probes = self.mux.unanswered_probes(), "modem stopped answering keep-alives");
                self.mux.request_close();
                return;
            }
            if let Err(err) = self.mux.ping() {
                warn!(%err, "failed to send keep-alive");
            }
        }

        if let Some(limit) = config.idle_timeout {
            let idle = self.mux.idle_for();
            if idle > limit {
                error!(idle_ms = idle.as_millis() as u64, "no frames from the modem; resetting link");
                self.mux.request_close();
            }
        }
    }

    fn fail(&self, err: MuxError) {
        if err.is_fatal() {
            self.mux.set_fatal(err.to_string());
        } else {
            error!(%err, "session error; resetting link");
            self.mux.request_close();
        }
    }

    /// Tick every `watchdog_interval` until `exit` is set or a fatal
    /// condition occurs, then shut down.
    pub fn run(&mut self, exit: &AtomicBool) -> Result<()> {
        let interval = self.mux.config().watchdog_interval;
        while !exit.load(Ordering::Acquire) {
            self.tick();

            if let Some(reason) = self.mux.fatal() {
                self.shutdown();
                return Err(MuxError::Fatal(reason));
            }

            let stats = self.mux.stats();
            debug!(
                state = %stats.state,
                buffered = stats.buffered,
                received = stats.received,
                dropped = stats.dropped,
                "watchdog tick"
            );

            let mut slept = Duration::ZERO;
            while slept < interval && !exit.load(Ordering::Acquire) {
                let step = SLEEP_STEP.min(interval - slept);
                thread::sleep(step);
                slept += step;
                // Faults detected between ticks are handled without waiting
                // out the rest of the interval.
                if self.mux.state() == LinkState::Closing {
                    break;
                }
            }
        }

        info!("exit requested; shutting down");
        self.shutdown();
        Ok(())
    }

    /// Close the session and enter Off.
    pub fn shutdown(&mut self) {
        self.pending = None;
        self.mux.close_session();
        self.mux.set_state(LinkState::Off);
    }
}
