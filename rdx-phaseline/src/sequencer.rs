//! The phase sequencer: owner of the authoritative experience timeline.
//!
//! The sequencer turns clock readings into a `(phase, progress)` pair and fans
//! that pair out, once per tick, to every registered subsystem and then to the
//! haptic channel. It is a plain synchronous state machine with two states,
//! `Stopped` and `Running`:
//!
//! - `Stopped -> Running` via [`PhaseSequencer::start`] or [`PhaseSequencer::start_at_phase`].
//! - `Running -> Running` via [`PhaseSequencer::tick`]; phase changes are internal.
//! - `Running -> Stopped` via [`PhaseSequencer::stop`] or a tick past the end.
//!
//! Starting while running is a restart (stop, then start), not an error.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::common::{PhaseId, SubsystemId, TaskId};
use crate::components::subsystem::{Subsystem, SubsystemFailure, SubsystemOp, SubsystemRegistry};
use crate::components::task::{ScheduledAction, Scheduler};
use crate::config::PhaselineConfig;
use crate::error::SequencerError;
use crate::events::{SequencerEvent, StopReason};
use crate::haptics::HapticProfile;
use crate::net::{EmitterStats, NetworkEmitter};
use crate::phase::PhaseTable;
use crate::time::SharedClock;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Durations handed to subsystems at the edges of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerOptions {
    pub fade_in: Duration,
    pub fade_out: Duration,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            fade_in: Duration::from_secs(2),
            fade_out: Duration::from_secs(3),
        }
    }
}

/// The mutable timeline state. Only the sequencer's own operations touch it.
///
/// Clock readings are unsigned, so the start instant is kept as the reading at
/// start plus the length of the timeline skipped by `start_at_phase`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequencerState {
    pub running: bool,
    pub started_at: Duration,
    pub offset: Duration,
    pub current_phase: PhaseId,
    pub progress: f32,
    pub elapsed: Duration,
}

/// A read-only copy of the sequencer's state for observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerSnapshot {
    pub running: bool,
    pub phase: PhaseId,
    pub progress: f32,
    pub elapsed: Duration,
    pub total: Duration,
    pub phase_count: usize,
    /// Time until the earliest scheduled action fires, if any is queued.
    pub next_action_in: Option<Duration>,
    pub network: Option<EmitterStats>,
}

pub struct PhaseSequencer {
    table: PhaseTable,
    clock: SharedClock,
    options: SequencerOptions,
    state: SequencerState,
    initialized: bool,
    subsystems: SubsystemRegistry,
    emitter: Option<NetworkEmitter>,
    haptics: HapticProfile,
    scheduler: Scheduler,
    events: broadcast::Sender<SequencerEvent>,
}

impl PhaseSequencer {
    /// Creates a stopped, uninitialized sequencer over `table`.
    pub fn new(table: PhaseTable, clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let haptics = HapticProfile::swell(table.phase_count());
        Self {
            table,
            clock,
            options: SequencerOptions::default(),
            state: SequencerState::default(),
            initialized: false,
            subsystems: SubsystemRegistry::new(),
            emitter: None,
            haptics,
            scheduler: Scheduler::new(),
            events,
        }
    }

    /// Builds a sequencer from configuration: phase table, fades, haptic
    /// profile, network emitter and one declared slot per configured subsystem.
    pub fn from_config(config: &PhaselineConfig, clock: SharedClock) -> Self {
        let mut sequencer = Self::new(config.timeline.phase_table(), clock)
            .with_options(SequencerOptions {
                fade_in: config.timeline.fade_in(),
                fade_out: config.timeline.fade_out(),
            })
            .with_haptics(config.haptic_profile());
        if let Some(emitter) = NetworkEmitter::from_config(&config.network) {
            sequencer = sequencer.with_emitter(emitter);
        }
        for subsystem in &config.subsystems {
            sequencer.declare(subsystem.name.clone());
        }
        sequencer
    }

    pub fn with_options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_emitter(mut self, emitter: NetworkEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_haptics(mut self, haptics: HapticProfile) -> Self {
        self.haptics = haptics;
        self
    }

    // --- Registration ---

    /// Registers a subsystem at the end of the update order.
    pub fn register(&mut self, subsystem: Box<dyn Subsystem>) -> SubsystemId {
        self.subsystems.register(subsystem)
    }

    /// Reserves a slot for a subsystem that will be attached later.
    pub fn declare(&mut self, name: impl Into<String>) -> SubsystemId {
        self.subsystems.declare(name)
    }

    /// Attaches `subsystem` to the declared slot of the same name, or registers
    /// it at the end if no such slot exists.
    pub fn attach(&mut self, subsystem: Box<dyn Subsystem>) -> SubsystemId {
        match self.subsystems.find(subsystem.name()) {
            Some(id) => {
                self.subsystems.attach(id, subsystem);
                id
            }
            None => self.subsystems.register(subsystem),
        }
    }

    /// Takes a subsystem out of its slot. Later ticks skip the empty slot.
    pub fn detach(&mut self, id: SubsystemId) -> Option<Box<dyn Subsystem>> {
        self.subsystems.detach(id)
    }

    pub fn subsystems(&self) -> &SubsystemRegistry {
        &self.subsystems
    }

    // --- Lifecycle ---

    /// Validates the timeline and arms the sequencer. Until this succeeds every
    /// start request is refused.
    pub fn initialize(&mut self) -> Result<(), SequencerError> {
        if self.table.total_duration().is_zero() {
            warn!("phase table has no playable duration; sequencer stays uninitialized");
            return Err(SequencerError::EmptyTimeline);
        }
        for name in self.subsystems.missing() {
            warn!(subsystem = name, "declared subsystem has no implementation; channel will be skipped");
        }
        match &self.emitter {
            Some(emitter) => debug!(endpoint = %emitter.endpoint(), "haptic channel ready"),
            None => info!("running without a haptic channel"),
        }
        self.initialized = true;
        info!(
            phases = self.table.phase_count(),
            total_secs = self.table.total_duration().as_secs_f64(),
            subsystems = self.subsystems.len(),
            "sequencer initialized"
        );
        Ok(())
    }

    /// Starts the experience at phase 1.
    pub fn start(&mut self) -> Result<(), SequencerError> {
        self.begin(PhaseId(1)).map(|_| ())
    }

    /// Starts the experience positioned at the beginning of `phase`, clamped to
    /// `1..=N` and moved past zero-length phases. The next tick reports that
    /// phase at progress 0. Returns the phase actually used.
    pub fn start_at_phase(&mut self, phase: PhaseId) -> Result<PhaseId, SequencerError> {
        self.begin(phase)
    }

    fn begin(&mut self, requested: PhaseId) -> Result<PhaseId, SequencerError> {
        if !self.initialized {
            warn!(phase = %requested, "start refused: sequencer is not initialized");
            return Err(SequencerError::NotInitialized);
        }
        if self.state.running {
            self.halt(StopReason::Restart);
        }

        let phase = self.table.playable_from(requested);
        if phase != requested {
            debug!(requested = %requested, actual = %phase, "start phase adjusted to a playable phase");
        }
        let offset = self.table.offset_of(phase);
        self.state = SequencerState {
            running: false,
            started_at: self.clock.now(),
            offset,
            current_phase: phase,
            progress: 0.0,
            elapsed: offset,
        };

        self.subsystems.rearm_missing_reports();
        let failures = self.subsystems.for_each(SubsystemOp::Initialize, |s| s.initialize());
        self.publish_failures(failures);
        let fade_in = self.options.fade_in;
        let failures = self.subsystems.for_each(SubsystemOp::FadeIn, |s| s.fade_in(fade_in));
        self.publish_failures(failures);

        if let Some(emitter) = self.emitter.as_mut() {
            emitter.send_start();
        }
        self.state.running = true;

        info!(%phase, offset_secs = offset.as_secs_f64(), "experience started");
        self.events
            .send(SequencerEvent::Started {
                phase,
                at: Utc::now(),
            })
            .ok();
        Ok(phase)
    }

    /// Advances the timeline to the clock reading `now`.
    ///
    /// Due scheduled actions run first. Then, if running: a reading at or past
    /// the total duration ends the run; anything earlier updates every subsystem
    /// in registration order and finally the haptic channel.
    pub fn tick(&mut self, now: Duration) {
        self.run_due_actions(now);
        if !self.state.running {
            return;
        }

        let elapsed = now
            .saturating_sub(self.state.started_at)
            .saturating_add(self.state.offset);
        self.state.elapsed = elapsed;
        if elapsed >= self.table.total_duration() {
            self.halt(StopReason::Completed);
            return;
        }

        let position = self.table.locate(elapsed);
        if position.phase != self.state.current_phase {
            debug!(from = %self.state.current_phase, to = %position.phase, "phase entered");
            self.events
                .send(SequencerEvent::PhaseEntered {
                    from: self.state.current_phase,
                    to: position.phase,
                })
                .ok();
        }
        self.state.current_phase = position.phase;
        self.state.progress = position.progress;

        let (phase, progress) = (position.phase, position.progress);
        let failures = self
            .subsystems
            .for_each(SubsystemOp::Update, |s| s.update(phase, progress));
        self.publish_failures(failures);

        if let Some(emitter) = self.emitter.as_mut() {
            let frame = self.haptics.frame(phase, progress);
            emitter.update_vibration(frame, now);
        }
    }

    /// Ends the run. Does nothing when already stopped.
    pub fn stop(&mut self) {
        if self.state.running {
            self.halt(StopReason::Requested);
        }
    }

    /// Stops any run, drops pending scheduled actions and leaves the haptic
    /// device still.
    pub fn shutdown(&mut self) {
        if self.state.running {
            self.halt(StopReason::Shutdown);
        }
        self.scheduler.clear();
        if let Some(emitter) = self.emitter.as_mut() {
            emitter.shutdown();
        }
    }

    fn halt(&mut self, reason: StopReason) {
        self.state.running = false;

        let fade_out = self.options.fade_out;
        let failures = self
            .subsystems
            .for_each(SubsystemOp::FadeOut, |s| s.fade_out(fade_out));
        self.publish_failures(failures);

        if let Some(emitter) = self.emitter.as_mut() {
            emitter.send_end();
        }

        info!(%reason, phase = %self.state.current_phase, "experience stopped");
        self.events
            .send(SequencerEvent::Stopped {
                reason,
                phase: self.state.current_phase,
                at: Utc::now(),
            })
            .ok();
    }

    fn publish_failures(&self, failures: Vec<SubsystemFailure>) {
        for failure in failures {
            self.events
                .send(SequencerEvent::SubsystemFailed {
                    name: failure.name,
                    op: failure.op,
                    error: failure.error,
                })
                .ok();
        }
    }

    // --- Scheduling ---

    /// Queues `action` to run `delay` after the current clock reading.
    pub fn schedule(&mut self, delay: Duration, action: ScheduledAction) -> TaskId {
        let due = self.clock.now().saturating_add(delay);
        debug!(?action, delay_secs = delay.as_secs_f64(), "action scheduled");
        self.scheduler.schedule(due, action)
    }

    pub fn cancel_scheduled(&mut self, id: TaskId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn pending_actions(&self) -> usize {
        self.scheduler.len()
    }

    fn run_due_actions(&mut self, now: Duration) {
        for (_, action) in self.scheduler.take_due(now) {
            debug!(?action, "running scheduled action");
            let outcome = match action {
                ScheduledAction::Start => self.start(),
                ScheduledAction::StartAtPhase(phase) => self.start_at_phase(phase).map(|_| ()),
                ScheduledAction::Stop => {
                    self.stop();
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                warn!(?action, error = %e, "scheduled action refused");
            }
        }
    }

    // --- Accessors ---

    pub fn current_phase(&self) -> PhaseId {
        self.state.current_phase
    }

    pub fn progress(&self) -> f32 {
        self.state.progress
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Timeline position at the last tick (or at start).
    pub fn elapsed(&self) -> Duration {
        self.state.elapsed
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn network_stats(&self) -> Option<EmitterStats> {
        self.emitter.as_ref().map(NetworkEmitter::stats)
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            running: self.state.running,
            phase: self.state.current_phase,
            progress: self.state.progress,
            elapsed: self.state.elapsed,
            total: self.table.total_duration(),
            phase_count: self.table.phase_count(),
            next_action_in: self
                .scheduler
                .next_due()
                .map(|due| due.saturating_sub(self.clock.now())),
            network: self.network_stats(),
        }
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.events.subscribe()
    }

    /// The sender side of the event stream, for handles that outlive a borrow.
    pub fn event_sender(&self) -> broadcast::Sender<SequencerEvent> {
        self.events.clone()
    }
}

impl std::fmt::Debug for PhaseSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSequencer")
            .field("state", &self.state)
            .field("initialized", &self.initialized)
            .field("table", &self.table)
            .field("subsystems", &self.subsystems)
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}
