use std::time::{Duration, Instant};

use crate::codec::{decode, Corruption, Decoded, FrameConfig, Mode, Window};

/// How long a started basic mode frame may stay incomplete before it is
/// dropped.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(1);

/// Stateful decoder: [`decode`] plus the stall timeout for frames whose
/// header arrived but whose body never does.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    config: FrameConfig,
    header_timeout: Option<Duration>,
    pending_since: Option<Instant>,
}

impl FrameDecoder {
    /// Create a decoder with the default 1 second stall timeout.
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            header_timeout: Some(DEFAULT_HEADER_TIMEOUT),
            pending_since: None,
        }
    }

    /// Change the stall timeout. `None` waits forever.
    #[cfg(test)]
    pub(crate) fn set_header_timeout(&mut self, timeout: Option<Duration>) {
        self.header_timeout = timeout;
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Replace the codec configuration.
    pub fn set_config(&mut self, config: FrameConfig) {
        self.config = config;
        self.pending_since = None;
    }

    /// Decode the first frame in `window`.
    ///
    /// Only basic mode frames stall on a length field, so the timeout only
    /// applies there.
    pub fn decode(&mut self, window: Window<'_>) -> Decoded {
        self.decode_at(window, Instant::now())
    }

    fn decode_at(&mut self, window: Window<'_>, now: Instant) -> Decoded {
        let decoded = decode(window, &self.config);
        match decoded {
            Decoded::Incomplete {
                discard,
                started: true,
            } if self.config.mode == Mode::Basic => {
                let since = *self.pending_since.get_or_insert(now);
                match self.header_timeout {
                    Some(limit) if now.duration_since(since) > limit => {
                        self.pending_since = None;
                        // Drop the opening flag; the scan restarts behind it.
                        Decoded::Corrupt {
                            consumed: discard + 1,
                            reason: Corruption::Timeout,
                        }
                    }
                    _ => decoded,
                }
            }
            _ => {
                self.pending_since = None;
                decoded
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}
