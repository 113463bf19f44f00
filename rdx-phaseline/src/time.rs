//! Clock sources for the sequencer.
//!
//! A clock reports monotonic elapsed time since an arbitrary start instant. The
//! sequencer never looks at wall time directly; it is handed a [`SharedClock`] at
//! construction, which is what makes scripted and test runs deterministic.

use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A monotonic source of elapsed time.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's start instant (or its last reset).
    fn now(&self) -> Duration;

    /// Moves the start instant to the present, so `now()` restarts near zero.
    fn reset(&self);
}

/// A clock shared between the sequencer, the engine loop and any subsystem that
/// needs to evaluate its own fades.
pub type SharedClock = Arc<dyn Clock>;

/// Real-time clock backed by a monotonic instant.
#[derive(Debug)]
pub struct SystemClock {
    origin: Mutex<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Mutex::new(Instant::now()),
        }
    }

    /// Convenience constructor returning the clock already wrapped for sharing.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.lock().elapsed()
    }

    fn reset(&self) {
        *self.origin.lock() = Instant::now();
    }
}

/// A clock that only moves when told to. Used by tests and scripted replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Jumps the clock to an absolute reading.
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
    }

    /// Shorthand for `set(Duration::from_secs_f64(secs))`.
    pub fn set_secs(&self, secs: f64) {
        self.set(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn reset(&self) {
        *self.now.lock() = Duration::ZERO;
    }
}

/// Defines the operational speed of the engine's tick loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// ~60 ticks per second. One tick per rendered frame.
    High,
    /// ~30 ticks per second.
    Medium,
    /// ~1 tick per second. Only useful for slow, log-driven runs.
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

impl ClockResolution {
    /// The interval between two engine ticks.
    pub fn tick_interval(&self) -> Duration {
        let ticks_per_second = match self {
            ClockResolution::High => 60,
            ClockResolution::Medium => 30,
            ClockResolution::Low => 1,
            ClockResolution::Custom { ticks_per_second } => (*ticks_per_second).max(1),
        };
        Duration::from_secs_f64(1.0 / ticks_per_second as f64)
    }
}

impl Default for ClockResolution {
    fn default() -> Self {
        ClockResolution::High
    }
}
