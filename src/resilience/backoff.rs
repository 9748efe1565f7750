//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Calculate the exponential delay that follows the given failed attempt.
///
/// Attempt 1 waits `base_ms`, each following attempt multiplies by `multiplier`,
/// capped at `max_ms`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, multiplier: u32, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = (multiplier as u64).saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    Duration::from_millis(delay_ms.min(max_ms))
}

/// Add 0 to 10% of random jitter to a delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let delay_ms = delay.as_millis() as u64;
    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(delay_ms + jitter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub multiplier: u32,
    pub max_ms: u64,
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms,
            multiplier: config.multiplier,
            max_ms: config.max_delay_ms,
            jitter: config.jitter,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = calculate_backoff(attempt, self.base_ms, self.multiplier, self.max_ms);
        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
