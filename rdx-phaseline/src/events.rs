//! Defines the events broadcast by the sequencer.
//!
//! Observers (the shell, the dev binary, tests) subscribe to this stream instead
//! of polling. Sending never blocks the tick loop: a lagging receiver simply
//! misses events.

use chrono::{DateTime, Utc};

use crate::common::PhaseId;
use crate::components::subsystem::SubsystemOp;
use crate::error::SubsystemError;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// The timeline reached its total duration.
    Completed,
    /// `start()` was called while running.
    Restart,
    /// The sequencer is being torn down.
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StopReason::Requested => "requested",
            StopReason::Completed => "completed",
            StopReason::Restart => "restart",
            StopReason::Shutdown => "shutdown",
        };
        f.write_str(label)
    }
}

/// Lifecycle and health events of a [`PhaseSequencer`](crate::sequencer::PhaseSequencer).
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// A run began at `phase` (1 for a plain start).
    Started { phase: PhaseId, at: DateTime<Utc> },
    /// The timeline crossed into a new phase.
    PhaseEntered { from: PhaseId, to: PhaseId },
    /// A run ended.
    Stopped {
        reason: StopReason,
        phase: PhaseId,
        at: DateTime<Utc>,
    },
    /// A subsystem returned an error; the fan-out carried on without it.
    SubsystemFailed {
        name: String,
        op: SubsystemOp,
        error: SubsystemError,
    },
}
