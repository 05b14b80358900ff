//! Resubscription delay schedule.

use std::time::Duration;

/// Delay before the first retry is `2 × INITIAL_BACKOFF_MS`.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on any single delay.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff: `min(initial × 2^attempt, max)`, attempt counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(INITIAL_BACKOFF_MS),
            max: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl Backoff {
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_doubles_then_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(2000));
        assert_eq!(backoff.delay(2), Duration::from_millis(4000));
        assert_eq!(backoff.delay(3), Duration::from_millis(8000));
        assert_eq!(backoff.delay(4), Duration::from_millis(16_000));
        assert_eq!(backoff.delay(5), Duration::from_millis(30_000));
        assert_eq!(backoff.delay(6), Duration::from_millis(30_000));
    }

    #[test]
    fn test_delays_are_non_decreasing_and_capped() {
        let backoff = Backoff::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=200 {
            let delay = backoff.delay(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= Duration::from_millis(MAX_BACKOFF_MS));
            previous = delay;
        }
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(MAX_BACKOFF_MS));
    }
}
