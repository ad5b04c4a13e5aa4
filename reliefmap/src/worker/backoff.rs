//! Reconnect backoff for the broker connection.

use std::time::Duration;

/// Default first reconnect delay.
pub const DEFAULT_RECONNECT_BASE_SECS: u64 = 5;

/// Default reconnect delay cap.
pub const DEFAULT_RECONNECT_MAX_SECS: u64 = 60;

/// Exponential backoff: `base`, doubling per failure, capped at `max`.
///
/// Unlike task retries this never gives up; the loop reconnects until it is
/// asked to stop.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_RECONNECT_BASE_SECS),
            Duration::from_secs(DEFAULT_RECONNECT_MAX_SECS),
        )
    }
}

impl ReconnectBackoff {
    /// Creates a backoff.
    ///
    /// # Arguments
    ///
    /// * `base` - Delay after the first failure
    /// * `max` - Delay cap; raised to `base` if smaller
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
            failures: 0,
        }
    }

    /// Delay before the next attempt; advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Returns to the base delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
