//! The phase table: an immutable, ordered list of phase durations.
//!
//! Index 0 is reserved for "not started" and never contributes to the timeline.
//! Phases `1..=N` are played back to back; the total duration is their sum.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::common::PhaseId;
use crate::error::SequencerError;

/// Where a point on the timeline falls inside the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePosition {
    pub phase: PhaseId,
    /// Normalized position inside `phase`, clamped to `[0, 1]`.
    pub progress: f32,
    /// Timeline offset at which `phase` begins.
    pub phase_start: Duration,
}

/// Ordered, immutable phase durations. Cheap to clone and share.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    durations: Arc<[Duration]>,
    total: Duration,
}

impl PhaseTable {
    /// Builds a table from durations where entry 0 is the reserved setup slot.
    ///
    /// An empty input still yields a table with the setup slot. An entry that
    /// would overflow the running total is logged and kept with zero length.
    pub fn new(durations: Vec<Duration>) -> Self {
        let mut durations = durations;
        if durations.is_empty() {
            durations.push(Duration::ZERO);
        }
        let mut total = Duration::ZERO;
        for (index, length) in durations.iter_mut().enumerate().skip(1) {
            match total.checked_add(*length) {
                Some(sum) => total = sum,
                None => {
                    warn!(phase = index, secs = length.as_secs_f64(), "phase duration overflows the timeline; skipping phase");
                    *length = Duration::ZERO;
                }
            }
        }
        Self {
            durations: durations.into(),
            total,
        }
    }

    /// Builds a table from seconds, as found in configuration files.
    ///
    /// Negative or non-finite entries are configuration errors: they are logged
    /// and the phase is kept with zero length, so the walk skips over it.
    pub fn from_secs(seconds: &[f64]) -> Self {
        let durations = seconds
            .iter()
            .enumerate()
            .map(|(index, &secs)| match Duration::try_from_secs_f64(secs) {
                Ok(d) => d,
                Err(_) => {
                    warn!(phase = index, value = secs, "invalid phase duration; skipping phase");
                    Duration::ZERO
                }
            })
            .collect();
        Self::new(durations)
    }

    /// Splits `total` evenly across `phase_count` timed phases.
    pub fn evenly_split(total: Duration, phase_count: usize) -> Self {
        let count = phase_count.max(1);
        let each = total / count as u32;
        let mut durations = Vec::with_capacity(count + 1);
        durations.push(Duration::ZERO);
        durations.extend(std::iter::repeat(each).take(count));
        Self::new(durations)
    }

    /// Number of timed phases (`N`), excluding the setup slot.
    pub fn phase_count(&self) -> usize {
        self.durations.len() - 1
    }

    /// Sum of the timed phases.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// The duration of one phase, or `None` outside the table.
    pub fn duration(&self, phase: PhaseId) -> Option<Duration> {
        self.durations.get(phase.0).copied()
    }

    /// Clamps a requested phase into `1..=N`.
    pub fn clamp(&self, phase: PhaseId) -> PhaseId {
        PhaseId(phase.0.clamp(1, self.phase_count().max(1)))
    }

    /// Strict lookup: `phase` must name a timed phase.
    pub fn checked(&self, phase: PhaseId) -> Result<PhaseId, SequencerError> {
        if (1..=self.phase_count()).contains(&phase.0) {
            Ok(phase)
        } else {
            Err(SequencerError::PhaseOutOfRange {
                phase,
                max: self.phase_count(),
            })
        }
    }

    /// Cumulative duration of every timed phase before `phase`.
    pub fn offset_of(&self, phase: PhaseId) -> Duration {
        self.durations
            .iter()
            .take(phase.0.min(self.durations.len()))
            .skip(1)
            .fold(Duration::ZERO, |acc, &length| acc.saturating_add(length))
    }

    /// The first phase at or after `phase` (clamped to `1..=N`) that has a
    /// non-zero duration, or `N` when none does. Starting there is what the
    /// next [`locate`](Self::locate) will report.
    pub fn playable_from(&self, phase: PhaseId) -> PhaseId {
        let first = self.clamp(phase);
        (first.0..=self.phase_count())
            .find(|&index| self.durations.get(index).is_some_and(|d| !d.is_zero()))
            .map(PhaseId)
            .unwrap_or(PhaseId(self.phase_count().max(1)))
    }

    /// Finds the phase containing `elapsed` and the progress inside it.
    ///
    /// Walks the table accumulating durations until the accumulator exceeds
    /// `elapsed`. Zero-length phases are therefore never reported. When nothing
    /// matches (rounding at the very end of the table) the final phase is
    /// reported complete rather than failing.
    pub fn locate(&self, elapsed: Duration) -> PhasePosition {
        let elapsed_secs = elapsed.as_secs_f64();
        let mut phase_start = Duration::ZERO;

        for (index, &length) in self.durations.iter().enumerate().skip(1) {
            let phase_end = phase_start + length;
            if phase_end.as_secs_f64() > elapsed_secs {
                let into = elapsed_secs - phase_start.as_secs_f64();
                let progress = (into / length.as_secs_f64()).clamp(0.0, 1.0) as f32;
                return PhasePosition {
                    phase: PhaseId(index),
                    progress,
                    phase_start,
                };
            }
            phase_start = phase_end;
        }

        let last = self.phase_count();
        PhasePosition {
            phase: PhaseId(last),
            progress: 1.0,
            phase_start: self.offset_of(PhaseId(last)),
        }
    }
}
