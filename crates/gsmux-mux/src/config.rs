use std::fmt;
use std::time::Duration;

use gsmux_frame::{FrameConfig, MAX_CHANNELS};

use crate::endpoint::FramingPolicy;
use crate::error::{MuxError, Result};

/// Timeouts for the AT command exchange before muxing starts.
#[derive(Debug, Clone)]
pub struct AtTimeouts {
    /// `AT`, `ATE0`. Default: 1s.
    pub probe: Duration,
    /// `AT+CPIN`. Default: 10s.
    pub pin: Duration,
    /// `AT+CMUX`. Default: 3s.
    pub cmux: Duration,
}

impl Default for AtTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(1),
            pin: Duration::from_secs(10),
            cmux: Duration::from_secs(3),
        }
    }
}

/// Multiplexer configuration.
#[derive(Clone)]
pub struct MuxConfig {
    /// Codec settings (mode, N1, fill).
    pub frame: FrameConfig,
    /// Logical channels to open, DLCI 1..=channels. Default: 2.
    pub channels: u8,
    /// SIM PIN sent before muxing, if any.
    pub pin: Option<u16>,
    /// Unanswered keep-alive probes tolerated before the link is reset.
    /// 0 disables probing.
    pub ping_probes: u32,
    /// Reset the link when no frame arrived for this long.
    pub idle_timeout: Option<Duration>,
    /// Watchdog tick. Default: 5s.
    pub watchdog_interval: Duration,
    /// Assembler wake-up when no new-data signal arrives. Default: 250ms.
    pub assembler_wait: Duration,
    /// Frame writes without progress before data is held back. Default: 5.
    pub write_retries: u32,
    /// Echo data frames back to the modem instead of delivering them.
    pub loop_test: bool,
    /// DLCIs whose applications write length-prefixed records.
    pub ps_channels: Vec<u8>,
    pub at: AtTimeouts,
    /// Pause between opening consecutive channels. Default: 1s.
    pub channel_open_delay: Duration,
    /// Read timeout on the physical link. Default: 100ms.
    pub link_read_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            channels: 2,
            pin: None,
            ping_probes: 0,
            idle_timeout: None,
            watchdog_interval: Duration::from_secs(5),
            assembler_wait: Duration::from_millis(250),
            write_retries: 5,
            loop_test: false,
            ps_channels: Vec::new(),
            at: AtTimeouts::default(),
            channel_open_delay: Duration::from_secs(1),
            link_read_timeout: Duration::from_millis(100),
        }
    }
}

impl MuxConfig {
    /// Check ranges that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || usize::from(self.channels) >= MAX_CHANNELS {
            return Err(MuxError::InvalidChannelCount(self.channels));
        }
        if let Some(&dlci) = self
            .ps_channels
            .iter()
            .find(|&&d| d == 0 || usize::from(d) >= MAX_CHANNELS)
        {
            return Err(MuxError::UnknownChannel(dlci));
        }
        Ok(())
    }

    /// Framing used for `dlci`'s application data.
    pub fn framing(&self, dlci: u8) -> FramingPolicy {
        if self.ps_channels.contains(&dlci) {
            FramingPolicy::LengthPrefixed
        } else {
            FramingPolicy::Raw
        }
    }
}

impl fmt::Debug for MuxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("MuxConfig");
        dbg.field("frame", &self.frame)
            .field("channels", &self.channels);
        if self.pin.is_some() {
            dbg.field("pin", &format_args!("<redacted>"));
        } else {
            dbg.field("pin", &Option::<u16>::None);
        }
        dbg.field("ping_probes", &self.ping_probes)
            .field("idle_timeout", &self.idle_timeout)
            .field("watchdog_interval", &self.watchdog_interval)
            .field("assembler_wait", &self.assembler_wait)
            .field("write_retries", &self.write_retries)
            .field("loop_test", &self.loop_test)
            .field("ps_channels", &self.ps_channels)
            .field("at", &self.at)
            .field("channel_open_delay", &self.channel_open_delay)
            .field("link_read_timeout", &self.link_read_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MuxConfig::default();
        assert_eq!(config.channels, 2);
        assert_eq!(config.write_retries, 5);
        assert_eq!(config.watchdog_interval, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn channel_count_range() {
        for channels in [0u8, 32, 200] {
            let config = MuxConfig {
                channels,
                ..MuxConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(MuxError::InvalidChannelCount(n)) if n == channels
            ));
        }
        let config = MuxConfig {
            channels: 31,
            ..MuxConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn framing_follows_ps_channels() {
        let config = MuxConfig {
            channels: 13,
            ps_channels: vec![11, 12, 13],
            ..MuxConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.framing(12), FramingPolicy::LengthPrefixed);
        assert_eq!(config.framing(1), FramingPolicy::Raw);

        let bad = MuxConfig {
            ps_channels: vec![0],
            ..MuxConfig::default()
        };
        assert!(matches!(bad.validate(), Err(MuxError::UnknownChannel(0))));
    }

    #[test]
    fn debug_redacts_pin() {
        let config = MuxConfig {
            pin: Some(1234),
            ..MuxConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("1234"));
    }
}
