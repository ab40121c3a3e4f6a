use std::time::Duration;

use memebot_core::ConfigError;

/// Attempt budget and backoff shape for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// A single attempt, never retried.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::new(
                "retry policy",
                "max_attempts must be at least 1",
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::new(
                "retry policy",
                "max_delay must not be shorter than base_delay",
            ));
        }
        Ok(())
    }

    /// Delay to wait after `failures` consecutive failed attempts.
    ///
    /// Doubles from `base_delay` with every failure and never exceeds
    /// `max_delay`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32
            .checked_shl(failures - 1)
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_after(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_backoff_huge_failure_count() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(64), Duration::from_secs(30));
        assert_eq!(policy.delay_after(0), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(
            RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }
}
