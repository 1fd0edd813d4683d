//! Capped exponential backoff for reconnects.

use std::time::Duration;

/// Delay before the reconnect following the `i`-th consecutive failure is
/// `min(base · 2^i, cap)`, with `i` counted from 0.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
        }
    }

    /// Delay after the `i`-th consecutive failure.
    pub fn delay_for(&self, i: u32) -> Duration {
        let factor = 2u32.checked_pow(i).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Record a failure and return the delay to wait before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base_until_cap() {
        let b = Backoff::default();
        assert_eq!(b.delay_for(0), Duration::from_millis(100));
        assert_eq!(b.delay_for(1), Duration::from_millis(200));
        assert_eq!(b.delay_for(2), Duration::from_millis(400));
        assert_eq!(b.delay_for(5), Duration::from_millis(3200));
        assert_eq!(b.delay_for(6), Duration::from_secs(5));
        assert_eq!(b.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn failures_advance_and_reset() {
        let mut b = Backoff::default();
        assert_eq!(b.on_failure(), Duration::from_millis(100));
        assert_eq!(b.on_failure(), Duration::from_millis(200));
        assert_eq!(b.on_failure(), Duration::from_millis(400));
        assert_eq!(b.failures(), 3);
        b.reset();
        assert_eq!(b.on_failure(), Duration::from_millis(100));
    }
}
