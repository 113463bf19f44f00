//! Haptic frames and the profile that derives them from the timeline.

use serde::Deserialize;

use crate::common::PhaseId;

/// The (intensity, frequency) pair sent to the vibration device for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HapticFrame {
    pub intensity: f32,
    pub frequency: f32,
}

impl HapticFrame {
    /// The "stop vibrating" frame.
    pub const ZERO: HapticFrame = HapticFrame {
        intensity: 0.0,
        frequency: 0.0,
    };

    pub fn new(intensity: f32, frequency: f32) -> Self {
        Self {
            intensity,
            frequency,
        }
    }

    /// Both channels clamped into `[0, 1]`. NaN collapses to zero.
    pub fn clamped(self) -> Self {
        Self {
            intensity: unit(self.intensity),
            frequency: unit(self.frequency),
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Linear envelope for one phase: values at progress 0 and at progress 1.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PhaseEnvelope {
    pub intensity: [f32; 2],
    pub frequency: [f32; 2],
}

impl PhaseEnvelope {
    fn sample(&self, progress: f32) -> HapticFrame {
        let t = unit(progress);
        HapticFrame {
            intensity: lerp(self.intensity, t),
            frequency: lerp(self.frequency, t),
        }
    }
}

fn lerp([from, to]: [f32; 2], t: f32) -> f32 {
    from + (to - from) * t
}

/// Maps `(phase, progress)` to a [`HapticFrame`].
///
/// Phases with an explicit envelope use it. Any other phase follows a slow swell
/// across the whole timeline: intensity climbs from 0 to 1 over all phases while
/// the frequency sits in the middle of the range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HapticProfile {
    envelopes: Vec<Option<PhaseEnvelope>>,
    phase_count: usize,
}

impl HapticProfile {
    /// A profile with no explicit envelopes for a timeline of `phase_count` phases.
    pub fn swell(phase_count: usize) -> Self {
        Self {
            envelopes: Vec::new(),
            phase_count,
        }
    }

    /// A profile whose `envelopes[i]` drives phase `i + 1`.
    pub fn with_envelopes(phase_count: usize, envelopes: Vec<PhaseEnvelope>) -> Self {
        Self {
            envelopes: envelopes.into_iter().map(Some).collect(),
            phase_count,
        }
    }

    pub fn frame(&self, phase: PhaseId, progress: f32) -> HapticFrame {
        if phase == PhaseId::SETUP {
            return HapticFrame::ZERO;
        }
        match self.envelopes.get(phase.0 - 1).copied().flatten() {
            Some(envelope) => envelope.sample(progress).clamped(),
            None => {
                let count = self.phase_count.max(1) as f32;
                let position = (phase.0 - 1) as f32 + unit(progress);
                HapticFrame::new(position / count, 0.5).clamped()
            }
        }
    }
}
