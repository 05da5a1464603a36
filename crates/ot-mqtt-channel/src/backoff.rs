//! Reconnect backoff policy.
//!
//! Exponential backoff with a ceiling. There is no attempt limit: the
//! session keeps retrying until it is explicitly disconnected.

use std::time::Duration;

use crate::config::MqttConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_initial_ms),
            Duration::from_secs(config.max_reconnect_interval_secs),
        )
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `initial * 2^(attempt-1)`, capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
