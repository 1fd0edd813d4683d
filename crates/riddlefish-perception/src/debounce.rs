//! [`DepartureDebounce`] – one absence signal per departure.

use std::time::{Duration, Instant};

/// Tracks the last sighting and fires once when nobody has been seen for
/// strictly longer than the timeout.  After firing it stays quiet until a new
/// sighting re-arms it.
#[derive(Debug, Clone)]
pub struct DepartureDebounce {
    timeout: Duration,
    last_seen: Instant,
    armed: bool,
}

impl DepartureDebounce {
    /// Start armed, as if someone had just been seen at `now`.
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_seen: now,
            armed: true,
        }
    }

    /// Record a sighting at `now`.
    pub fn seen(&mut self, now: Instant) {
        self.last_seen = now;
        self.armed = true;
    }

    /// Record a frame without anyone in it.  Returns `true` exactly when the
    /// absence signal should be emitted.
    pub fn unseen(&mut self, now: Instant) -> bool {
        if self.armed && now.saturating_duration_since(self.last_seen) > self.timeout {
            self.armed = false;
            return true;
        }
        false
    }
}
