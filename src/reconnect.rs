//! Reconnect policy: attempt counting and exponential backoff with a clamp.

use std::time::Duration;

use crate::config::Config;

/// Tracks reconnect attempts and the current backoff.
///
/// `attempts_made` is monotonic for the lifetime of one `Connecting`/`Disconnected` cycle:
/// a successful handshake does not reset it mid-session. The crate preserves this
/// ambiguity from the source design rather than resolving it (see DESIGN.md).
#[derive(Clone, Debug)]
pub struct ReconnectState {
    reconnect_enabled: bool,
    max_reconnects: u32,
    initial_delay: Duration,
    max_backoff: Duration,
    attempts_made: u32,
    current_backoff: Duration,
}

impl ReconnectState {
    pub fn new(config: &Config) -> Self {
        Self {
            reconnect_enabled: config.reconnect_enabled,
            max_reconnects: config.max_reconnects,
            initial_delay: config.initial_reconnect_delay(),
            max_backoff: config.max_backoff(),
            attempts_made: 0,
            current_backoff: Duration::ZERO,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Reset counters (called on `Inactive -> Prepared`).
    pub fn reset(&mut self) {
        self.attempts_made = 0;
        self.current_backoff = Duration::ZERO;
    }

    /// Apply the policy for a failed attempt.
    ///
    /// Returns `Some(backoff)` to sleep before retrying, incrementing `attempts_made`, or
    /// `None` if retries must stop permanently (reconnect disabled, or the budget is
    /// exhausted).
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.reconnect_enabled {
            return None;
        }
        if self.max_reconnects > 0 && self.attempts_made >= self.max_reconnects {
            return None;
        }

        let doubled = self.current_backoff.saturating_mul(2);
        let candidate = doubled.max(self.initial_delay);
        self.current_backoff = candidate.min(self.max_backoff);
        self.attempts_made += 1;
        Some(self.current_backoff)
    }
}
