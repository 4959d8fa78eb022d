//! Retry policy: decides redelivery delays.

use std::time::Duration;

use crate::config::QueueConfig;

/// Upper bound for any redelivery delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Retry policy for messages whose handler failed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay for the first redelivery.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Delay before the next delivery, given the number of deliveries made
    /// so far (1-indexed): `base_delay * multiplier^(attempts - 1)`.
    ///
    /// With base_delay=2s, multiplier=2.0: 2s, 4s, 8s, 16s, 32s.
    /// Never more than [`MAX_BACKOFF`].
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}
