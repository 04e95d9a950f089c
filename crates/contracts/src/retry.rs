//! Exponential backoff retry policy owned by sinks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for sink calls
///
/// `max_retries` counts retries after the first attempt, so a call is tried at
/// most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied around the computed delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Default backoff with the given retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay with jitter, given a sample in `[0.0, 1.0)`
    pub fn backoff_with_jitter(&self, retry: u32, sample: f64) -> Duration {
        let base = self.backoff(retry);
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        let scale = 1.0 - jitter + 2.0 * jitter * sample.clamp(0.0, 1.0);
        base.mul_f64(scale).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter_factor: 0.0,
        };
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..RetryPolicy::default()
        };
        let low = policy.backoff_with_jitter(1, 0.0);
        let high = policy.backoff_with_jitter(1, 0.999);
        assert_eq!(low, Duration::from_millis(50));
        assert!(high > Duration::from_millis(140) && high <= Duration::from_millis(150));
    }

    #[test]
    fn test_attempts() {
        assert_eq!(RetryPolicy::with_max_retries(3).max_attempts(), 4);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }
}
