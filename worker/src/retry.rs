//! Shared exponential backoff policy, used both for retrying a terminal callback publish and
//! for retrying the initial broker connection.
//!
//! Grounded on the same retry shape `ouroboros-tasks::retry::RetryPolicy` uses: exponential
//! growth from an initial delay, capped at a maximum, with jitter so that many workers racing to
//! reconnect after a broker restart don't all retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Backoff policy for retrying a fallible operation a bounded number of times.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_secs_f64()
            * self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
        Duration::from_secs_f64(capped * jitter_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        let first = policy.delay_for_attempt(1);
        let second = policy.delay_for_attempt(2);
        assert!(first >= Duration::from_millis(100));
        assert!(second >= first);
        let far = policy.delay_for_attempt(20);
        assert!(far <= Duration::from_millis(1250));
    }
}
