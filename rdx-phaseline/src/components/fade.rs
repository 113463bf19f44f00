//! Fade envelopes evaluated against a clock.
//!
//! A fade is a scheduled action with a start time and a duration. Its level is
//! computed from the clock reading on demand, so a fade finishes on time even
//! when nobody updates the subsystem that owns it.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    direction: FadeDirection,
    started_at: Duration,
    duration: Duration,
}

impl Fade {
    pub fn fade_in(started_at: Duration, duration: Duration) -> Self {
        Self {
            direction: FadeDirection::In,
            started_at,
            duration,
        }
    }

    pub fn fade_out(started_at: Duration, duration: Duration) -> Self {
        Self {
            direction: FadeDirection::Out,
            started_at,
            duration,
        }
    }

    /// Linear completion in `[0, 1]` at `now`. Zero-length fades are complete
    /// immediately.
    pub fn completion(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let into = now.saturating_sub(self.started_at).as_secs_f64();
        (into / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// Gain in `[0, 1]` at `now`: rising for a fade-in, falling for a fade-out.
    pub fn gain(&self, now: Duration) -> f32 {
        let done = self.completion(now);
        match self.direction {
            FadeDirection::In => done,
            FadeDirection::Out => 1.0 - done,
        }
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        now.saturating_sub(self.started_at) >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_out_reaches_silence_and_stays_there() {
        let fade = Fade::fade_out(Duration::from_secs(10), Duration::from_secs(2));
        assert_eq!(fade.gain(Duration::from_secs(10)), 1.0);
        assert!((fade.gain(Duration::from_secs(11)) - 0.5).abs() < 1e-6);
        assert_eq!(fade.gain(Duration::from_secs(12)), 0.0);
        assert_eq!(fade.gain(Duration::from_secs(600)), 0.0);
        assert!(fade.is_complete(Duration::from_secs(12)));
    }

    #[test]
    fn fade_in_rises() {
        let fade = Fade::fade_in(Duration::ZERO, Duration::from_secs(4));
        assert_eq!(fade.gain(Duration::ZERO), 0.0);
        assert!((fade.gain(Duration::from_secs(1)) - 0.25).abs() < 1e-6);
        assert!(!fade.is_complete(Duration::from_secs(3)));
    }

    #[test]
    fn zero_length_fade_completes_at_once() {
        let fade = Fade::fade_out(Duration::from_secs(5), Duration::ZERO);
        assert_eq!(fade.gain(Duration::from_secs(5)), 0.0);
        assert!(fade.is_complete(Duration::from_secs(5)));
    }
}
