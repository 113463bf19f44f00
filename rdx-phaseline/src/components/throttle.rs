//! Interval gating for rate-limited channels.

use std::time::Duration;

/// Lets an action through at most once per `interval`.
///
/// Timestamps come from the caller's clock rather than from `Instant::now()`, so
/// the gate behaves the same under a manual clock as it does in real time.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Duration>,
}

impl Throttle {
    /// Creates a new `Throttle`. The first call to [`Throttle::try_fire`] always passes.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Returns `true` if the interval has elapsed at `now`, without firing.
    pub fn is_ready(&self, now: Duration) -> bool {
        match self.last_fired {
            None => true,
            // A clock that went backwards (reset) counts as ready.
            Some(last) => now < last || now - last >= self.interval,
        }
    }

    /// Fires if the interval has elapsed and records `now` as the last firing.
    /// Returns `true` if the caller may proceed.
    pub fn try_fire(&mut self, now: Duration) -> bool {
        if self.is_ready(now) {
            self.last_fired = Some(now);
            return true;
        }
        false
    }

    /// Forgets the last firing so the next call passes immediately.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
