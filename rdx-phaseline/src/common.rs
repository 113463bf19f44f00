//! Contains common, primitive types shared across the sequencer.
//!
//! Registered subsystems and scheduled actions are tracked with `slotmap` keys so
//! that a detached or completed entry can never be confused with a newer one.

use serde::Deserialize;
use slotmap::new_key_type;

new_key_type! {
    /// Uniquely identifies a subsystem slot within the sequencer.
    ///
    /// Returned when a subsystem is registered or declared. The key stays valid in
    /// the registration order even after the implementation is detached, which is
    /// how the sequencer notices (and skips) a missing collaborator.
    pub struct SubsystemId;

    /// Uniquely identifies a scheduled action such as an auto-start delay.
    pub struct TaskId;
}

/// Index of a phase in the [`PhaseTable`](crate::phase::PhaseTable).
///
/// Index 0 is the reserved "not started" slot; timed phases are `1..=N`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub usize);

impl PhaseId {
    /// The reserved setup phase reported while nothing is running.
    pub const SETUP: PhaseId = PhaseId(0);
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
