//! The subsystem contract and the ordered registry the sequencer fans out to.

use slotmap::SlotMap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::warn;

use crate::common::{PhaseId, SubsystemId};
use crate::error::SubsystemError;

/// An output channel driven by the timeline (star field, visual effects,
/// spatial audio, ...).
///
/// All methods are called synchronously from the tick loop and must not block.
///
/// - `initialize` is idempotent and cancels any fade still in flight.
/// - `update` runs every tick while the experience is running.
/// - `fade_out` only schedules the fade. The subsystem must reach its silent
///   end state once `duration` has elapsed even if nothing else is called.
pub trait Subsystem: Send {
    fn name(&self) -> &str;

    fn initialize(&mut self) -> Result<(), SubsystemError>;

    /// Called right after `initialize` when a run starts.
    fn fade_in(&mut self, _duration: Duration) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn update(&mut self, phase: PhaseId, progress: f32) -> Result<(), SubsystemError>;

    fn fade_out(&mut self, duration: Duration) -> Result<(), SubsystemError>;
}

/// Which contract method a fan-out is calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemOp {
    Initialize,
    FadeIn,
    Update,
    FadeOut,
}

impl SubsystemOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemOp::Initialize => "initialize",
            SubsystemOp::FadeIn => "fade_in",
            SubsystemOp::Update => "update",
            SubsystemOp::FadeOut => "fade_out",
        }
    }
}

impl std::fmt::Display for SubsystemOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subsystem that returned an error during a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemFailure {
    pub id: SubsystemId,
    pub name: String,
    pub op: SubsystemOp,
    pub error: SubsystemError,
}

struct Slot {
    name: String,
    subsystem: Option<Box<dyn Subsystem>>,
    missing_reported: bool,
}

/// Subsystems in registration order.
///
/// A slot can exist without an implementation (declared by configuration but
/// never attached, or detached later). Fan-outs skip such slots and warn once
/// per run.
#[derive(Default)]
pub struct SubsystemRegistry {
    slots: SlotMap<SubsystemId, Slot>,
    order: Vec<SubsystemId>,
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subsystem at the end of the update order.
    pub fn register(&mut self, subsystem: Box<dyn Subsystem>) -> SubsystemId {
        let name = subsystem.name().to_string();
        self.insert(name, Some(subsystem))
    }

    /// Reserves a named slot whose implementation will be attached later.
    pub fn declare(&mut self, name: impl Into<String>) -> SubsystemId {
        self.insert(name.into(), None)
    }

    fn insert(&mut self, name: String, subsystem: Option<Box<dyn Subsystem>>) -> SubsystemId {
        let id = self.slots.insert(Slot {
            name,
            subsystem,
            missing_reported: false,
        });
        self.order.push(id);
        id
    }

    /// Puts an implementation into an existing slot, replacing any previous one.
    /// Returns `false` if the slot does not exist.
    pub fn attach(&mut self, id: SubsystemId, subsystem: Box<dyn Subsystem>) -> bool {
        match self.slots.get_mut(id) {
            Some(slot) => {
                slot.subsystem = Some(subsystem);
                slot.missing_reported = false;
                true
            }
            None => false,
        }
    }

    /// Takes the implementation out of a slot, keeping its place in the order.
    pub fn detach(&mut self, id: SubsystemId) -> Option<Box<dyn Subsystem>> {
        self.slots.get_mut(id).and_then(|slot| slot.subsystem.take())
    }

    /// Finds the first slot with the given name.
    pub fn find(&self, name: &str) -> Option<SubsystemId> {
        self.order
            .iter()
            .copied()
            .find(|&id| self.slots.get(id).is_some_and(|slot| slot.name == name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Slot names in update order.
    pub fn names(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&id| self.slots.get(id))
            .map(|slot| slot.name.as_str())
            .collect()
    }

    /// Names of slots that currently have no implementation.
    pub fn missing(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&id| self.slots.get(id))
            .filter(|slot| slot.subsystem.is_none())
            .map(|slot| slot.name.as_str())
            .collect()
    }

    /// Allows missing slots to be reported again. Called at the start of a run.
    pub(crate) fn rearm_missing_reports(&mut self) {
        for slot in self.slots.values_mut() {
            slot.missing_reported = false;
        }
    }

    /// Calls `f` on every present subsystem in registration order.
    ///
    /// Errors are collected, never propagated: a failing subsystem does not stop
    /// the rest of the fan-out. A panic inside `f` is caught and recorded as
    /// [`SubsystemError::Panicked`].
    pub(crate) fn for_each<F>(&mut self, op: SubsystemOp, mut f: F) -> Vec<SubsystemFailure>
    where
        F: FnMut(&mut dyn Subsystem) -> Result<(), SubsystemError>,
    {
        let mut failures = Vec::new();
        for &id in &self.order {
            let Some(slot) = self.slots.get_mut(id) else {
                continue;
            };
            match slot.subsystem.as_mut() {
                Some(subsystem) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(subsystem.as_mut())))
                        .unwrap_or_else(|payload| Err(SubsystemError::Panicked(panic_message(payload.as_ref()))));
                    if let Err(error) = outcome {
                        warn!(subsystem = %slot.name, %op, %error, "subsystem call failed");
                        failures.push(SubsystemFailure {
                            id,
                            name: slot.name.clone(),
                            op,
                            error,
                        });
                    }
                }
                None if !slot.missing_reported => {
                    warn!(subsystem = %slot.name, %op, "subsystem missing; skipping channel");
                    slot.missing_reported = true;
                }
                None => {}
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl std::fmt::Debug for SubsystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemRegistry")
            .field("order", &self.names())
            .field("missing", &self.missing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: CallLog,
        fail_updates: bool,
    }

    impl Subsystem for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&mut self) -> Result<(), SubsystemError> {
            self.log.lock().push(format!("{}:init", self.name));
            Ok(())
        }

        fn update(&mut self, phase: PhaseId, _progress: f32) -> Result<(), SubsystemError> {
            self.log.lock().push(format!("{}:update:{}", self.name, phase));
            if self.fail_updates {
                return Err(SubsystemError::Update("boom".into()));
            }
            Ok(())
        }

        fn fade_out(&mut self, _duration: Duration) -> Result<(), SubsystemError> {
            self.log.lock().push(format!("{}:fade_out", self.name));
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &CallLog, fail_updates: bool) -> Box<dyn Subsystem> {
        Box::new(Recorder {
            name,
            log: log.clone(),
            fail_updates,
        })
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let log = CallLog::default();
        let mut registry = SubsystemRegistry::new();
        registry.register(recorder("b", &log, false));
        registry.register(recorder("a", &log, false));
        registry.register(recorder("c", &log, false));

        registry.for_each(SubsystemOp::Update, |s| s.update(PhaseId(2), 0.1));
        assert_eq!(*log.lock(), vec!["b:update:2", "a:update:2", "c:update:2"]);
    }

    #[test]
    fn a_failing_subsystem_does_not_stop_the_others() {
        let log = CallLog::default();
        let mut registry = SubsystemRegistry::new();
        registry.register(recorder("a", &log, true));
        let b = registry.register(recorder("b", &log, false));

        let failures = registry.for_each(SubsystemOp::Update, |s| s.update(PhaseId(1), 0.0));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "a");
        assert_eq!(failures[0].op, SubsystemOp::Update);
        assert_ne!(failures[0].id, b);
        assert_eq!(log.lock().len(), 2);
    }

    struct Exploding;

    impl Subsystem for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn initialize(&mut self) -> Result<(), SubsystemError> {
            Ok(())
        }

        fn update(&mut self, phase: PhaseId, _progress: f32) -> Result<(), SubsystemError> {
            panic!("lost the render target in {phase}");
        }

        fn fade_out(&mut self, _duration: Duration) -> Result<(), SubsystemError> {
            Ok(())
        }
    }

    #[test]
    fn a_panicking_subsystem_is_recorded_and_the_fan_out_continues() {
        let log = CallLog::default();
        let mut registry = SubsystemRegistry::new();
        registry.register(recorder("a", &log, false));
        registry.register(Box::new(Exploding));
        registry.register(recorder("c", &log, false));

        for _ in 0..2 {
            let failures = registry.for_each(SubsystemOp::Update, |s| s.update(PhaseId(2), 0.5));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, "exploding");
            assert_eq!(
                failures[0].error,
                SubsystemError::Panicked("lost the render target in 2".into())
            );
        }
        assert_eq!(
            *log.lock(),
            vec!["a:update:2", "c:update:2", "a:update:2", "c:update:2"]
        );
    }

    #[test]
    fn declared_and_detached_slots_are_skipped() {
        let log = CallLog::default();
        let mut registry = SubsystemRegistry::new();
        let stars = registry.declare("starfield");
        let audio = registry.register(recorder("audio", &log, false));
        assert_eq!(registry.missing(), vec!["starfield"]);

        registry.for_each(SubsystemOp::Initialize, |s| s.initialize());
        assert_eq!(*log.lock(), vec!["audio:init"]);

        assert!(registry.attach(stars, recorder("starfield", &log, false)));
        assert!(registry.detach(audio).is_some());
        assert_eq!(registry.missing(), vec!["audio"]);
        assert_eq!(registry.names(), vec!["starfield", "audio"]);

        registry.for_each(SubsystemOp::FadeOut, |s| s.fade_out(Duration::ZERO));
        assert_eq!(log.lock().last().unwrap(), "starfield:fade_out");
    }
}
