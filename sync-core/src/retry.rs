//! Retry policy for queued pushes.
//!
//! A failed push leaves its entry at the head of the domain's queue. The
//! policy decides when that entry may be attempted again, and when it has
//! used up its budget and moves to the dead-letter set.

use dsync_types::Timestamp;
use std::time::Duration;

/// Default number of push attempts before an entry is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff and budget for failed pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Push attempts allowed before an entry is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound for the random jitter added on top.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests and manual triggers.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Whether an entry with `attempts` failures has used up its budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before the attempt following the `attempts`-th failure.
    ///
    /// Formula: min(max_delay, base_delay * 2^(attempts-1)) + random(0..=jitter)
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        self.exponential(attempts) + self.random_jitter()
    }

    /// When an entry that failed for the `attempts`-th time at `failed_at`
    /// may be pushed again.
    ///
    /// Draws a fresh jitter on every call.
    pub fn next_attempt_at(&self, attempts: u32, failed_at: Timestamp) -> Timestamp {
        let delay = self.delay_for(attempts).as_millis().min(u128::from(u64::MAX)) as u64;
        Timestamp::from_millis(failed_at.as_millis().saturating_add(delay))
    }

    fn exponential(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1).min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn random_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut bytes = [0u8; 8];
        if getrandom::getrandom(&mut bytes).is_err() {
            return Duration::ZERO;
        }
        Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_five_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
    }

    #[test]
    fn delay_capped_at_max_plus_jitter() {
        let policy = RetryPolicy::default();
        let delay = policy.delay_for(40);
        assert!(delay >= Duration::from_secs(30));
        assert!(
            delay <= Duration::from_secs(30) + Duration::from_millis(250),
            "delay must be capped, got {:?}",
            delay
        );
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn next_attempt_waits_for_backoff() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let failed_at = Timestamp::from_millis(10_000);

        assert_eq!(
            policy.next_attempt_at(1, failed_at),
            Timestamp::from_millis(11_000)
        );
        // second failure doubles the wait
        assert_eq!(
            policy.next_attempt_at(2, failed_at),
            Timestamp::from_millis(12_000)
        );
    }

    #[test]
    fn next_attempt_includes_jitter() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::from_millis(500),
        };
        let failed_at = Timestamp::from_millis(1_000);
        for _ in 0..50 {
            let next = policy.next_attempt_at(1, failed_at);
            assert!(next >= failed_at);
            assert!(next <= Timestamp::from_millis(1_500));
        }
    }

    #[test]
    fn immediate_policy_retries_at_once() {
        let policy = RetryPolicy::immediate(3);
        let now = Timestamp::from_millis(5);
        assert_eq!(policy.next_attempt_at(2, now), now);
        assert!(policy.is_exhausted(3));
    }
}
