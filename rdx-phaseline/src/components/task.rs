//! Deferred sequencer actions: auto-start delays, intro hand-offs, debug jumps.
//!
//! Nothing here suspends. Each action carries a due time on the sequencer's
//! clock and is released by the same tick that advances the timeline.

use slotmap::SlotMap;
use std::time::Duration;

use crate::common::{PhaseId, TaskId};

/// What to do when a scheduled task comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Start from phase 1.
    Start,
    /// Start with the timeline positioned at the beginning of a phase.
    StartAtPhase(PhaseId),
    /// Stop the running experience.
    Stop,
}

#[derive(Debug)]
struct ScheduledTask {
    due: Duration,
    seq: u64,
    action: ScheduledAction,
}

/// A queue of actions keyed by [`TaskId`].
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: SlotMap<TaskId, ScheduledTask>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `action` to run at the clock reading `due`.
    pub fn schedule(&mut self, due: Duration, action: ScheduledAction) -> TaskId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert(ScheduledTask { due, seq, action })
    }

    /// Cancels a pending task. Returns `true` if it was still queued.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The earliest due time still queued.
    pub fn next_due(&self) -> Option<Duration> {
        self.tasks.values().map(|task| task.due).min()
    }

    /// Removes and returns every task due at `now`, earliest first. Tasks due at
    /// the same instant come out in scheduling order.
    pub fn take_due(&mut self, now: Duration) -> Vec<(TaskId, ScheduledAction)> {
        let mut due: Vec<(TaskId, Duration, u64)> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.due <= now)
            .map(|(id, task)| (id, task.due, task.seq))
            .collect();
        due.sort_by_key(|&(_, at, seq)| (at, seq));

        due.into_iter()
            .filter_map(|(id, _, _)| self.tasks.remove(id).map(|task| (id, task.action)))
            .collect()
    }
}
