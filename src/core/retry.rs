//! Reconnect backoff with exponential growth and jitter.
//!
//! Jitter spreads simultaneous reconnects from many clients over time so a
//! recovering endpoint is not hit by a synchronized storm.

use std::time::Duration;

use crate::config::ProviderOptions;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

impl BackoffPolicy {
    pub fn from_options(options: &ProviderOptions) -> Self {
        Self {
            initial: options.retry_backoff,
            max: options.retry_backoff_max,
            multiplier: options.retry_backoff_multiplier,
            jitter: options.retry_jitter,
        }
    }

    /// Base delay for the first retry after a failure run begins.
    pub fn first_delay(&self) -> Duration {
        self.initial
    }

    /// Next base delay after `current` was used: multiply and cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_millis() as f64 * self.multiplier;
        let capped = grown.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// The actual sleep for a base delay, with random jitter added.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter = rand::random::<f64>() * self.jitter.as_millis() as f64;
        delay + Duration::from_millis(jitter as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(5000),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_delays_grow_exponentially() {
        let policy = policy();
        let first = policy.first_delay();
        let second = policy.next_delay(first);
        let third = policy.next_delay(second);

        assert_eq!(first.as_millis(), 1000);
        assert_eq!(second.as_millis(), 2000);
        assert_eq!(third.as_millis(), 4000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = policy();
        let mut delay = policy.first_delay();
        for _ in 0..10 {
            delay = policy.next_delay(delay);
        }

        assert_eq!(delay.as_millis(), 5000);
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = BackoffPolicy {
            jitter: Duration::from_millis(100),
            ..policy()
        };

        let base = Duration::from_millis(1000);
        let jittered = policy.jittered(base);

        assert!(jittered >= base);
        assert!(jittered < base + Duration::from_millis(100));
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let policy = policy();
        let base = Duration::from_millis(1000);
        assert_eq!(policy.jittered(base), base);
    }
}
