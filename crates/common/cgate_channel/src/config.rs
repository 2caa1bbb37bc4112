use std::fmt;
use std::time::Duration;

/// Which C-Gate port a link is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The request/response port.
    Command,
    /// The unsolicited event port.
    Event,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Command => write!(f, "command"),
            LinkKind::Event => write!(f, "event"),
        }
    }
}

/// Configuration of one C-Gate link.
#[derive(Debug, Clone)]
pub struct Config {
    /// C-Gate host to connect to.
    pub host: String,

    /// C-Gate port, usually 20023 for commands and 20025 for events.
    pub port: u16,

    /// The role of this link, used for logging and connect-time behavior.
    pub kind: LinkKind,

    /// Reconnect backoff applied after a failed connect or a dropped link.
    pub reconnect: ReconnectPolicy,
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16, kind: LinkKind) -> Config {
        Config {
            host: host.into(),
            port,
            kind,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Set a custom reconnect backoff
    pub fn with_reconnect(self, reconnect: ReconnectPolicy) -> Self {
        Self { reconnect, ..self }
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay,
            max_delay,
        }
    }

    /// Delay before the given 1-based attempt: `initial * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1);
        match 2u32.checked_pow(doublings) {
            Some(factor) => self
                .initial_delay
                .checked_mul(factor)
                .unwrap_or(self.max_delay)
                .min(self.max_delay),
            None => self.max_delay,
        }
    }
}
