//! The engine that drives a [`PhaseSequencer`] in real time.
//!
//! The sequencer itself is a plain state machine; the engine owns the tick loop
//! around it. It is cheap to clone: every clone is a handle onto the same
//! sequencer, so the shell can issue commands while the loop keeps ticking.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, trace, warn};

use crate::common::{PhaseId, TaskId};
use crate::components::task::ScheduledAction;
use crate::config::{DebugConfig, PhaselineConfig, TimelineConfig};
use crate::error::SequencerError;
use crate::events::SequencerEvent;
use crate::sequencer::{PhaseSequencer, SequencerSnapshot};
use crate::time::{ClockResolution, SharedClock};

/// How and when an experience starts once the engine is launched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchPlan {
    pub delay: Duration,
    pub action: ScheduledAction,
}

impl LaunchPlan {
    /// Derives the launch from configuration.
    ///
    /// - Debug mode starts at `debug.start_phase` right away.
    /// - With an intro, the timeline starts at the hand-off phase once the
    ///   auto-start delay and the intro have both run.
    /// - Otherwise phase 1 starts after the auto-start delay.
    pub fn from_config(timeline: &TimelineConfig, debug: &DebugConfig) -> Self {
        if debug.enabled {
            return Self {
                delay: Duration::ZERO,
                action: ScheduledAction::StartAtPhase(PhaseId(debug.start_phase)),
            };
        }
        let delay = timeline.auto_start_delay();
        match timeline.intro_duration() {
            Some(intro) => Self {
                delay: delay.saturating_add(intro),
                action: ScheduledAction::StartAtPhase(PhaseId(timeline.intro_handoff_phase)),
            },
            None => Self {
                delay,
                action: ScheduledAction::Start,
            },
        }
    }
}

#[derive(Clone)]
pub struct PhaselineEngine {
    sequencer: Arc<Mutex<PhaseSequencer>>,
    clock: SharedClock,
    resolution: ClockResolution,
    events: broadcast::Sender<SequencerEvent>,
}

impl PhaselineEngine {
    pub fn new(sequencer: PhaseSequencer, resolution: ClockResolution) -> Self {
        let clock = Arc::clone(sequencer.clock());
        let events = sequencer.event_sender();
        Self {
            sequencer: Arc::new(Mutex::new(sequencer)),
            clock,
            resolution,
            events,
        }
    }

    /// Builds the sequencer from `config` and wraps it in an engine.
    pub fn from_config(config: &PhaselineConfig, clock: SharedClock) -> Self {
        let sequencer = PhaseSequencer::from_config(config, clock);
        Self::new(sequencer, config.clock.resolution.clone())
    }

    /// Queues the configured launch on the sequencer.
    ///
    /// A debug start phase outside the table is reported and clamped.
    pub async fn schedule_launch(&self, timeline: &TimelineConfig, debug: &DebugConfig) -> TaskId {
        let plan = LaunchPlan::from_config(timeline, debug);
        let mut sequencer = self.sequencer.lock().await;
        if let ScheduledAction::StartAtPhase(phase) = plan.action {
            if let Err(e) = sequencer.table().checked(phase) {
                warn!(error = %e, "launch phase will be clamped");
            }
        }
        info!(
            delay_secs = plan.delay.as_secs_f64(),
            action = ?plan.action,
            "launch scheduled"
        );
        sequencer.schedule(plan.delay, plan.action)
    }

    /// Exclusive access to the sequencer, e.g. to attach subsystems before the
    /// loop starts.
    pub async fn sequencer(&self) -> MutexGuard<'_, PhaseSequencer> {
        self.sequencer.lock().await
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub async fn start(&self) -> Result<(), SequencerError> {
        self.sequencer.lock().await.start()
    }

    /// Restarts the experience at `phase`, clamped to the table and moved past
    /// zero-length phases. Returns the phase actually used.
    pub async fn jump(&self, phase: PhaseId) -> Result<PhaseId, SequencerError> {
        self.sequencer.lock().await.start_at_phase(phase)
    }

    pub async fn stop(&self) {
        self.sequencer.lock().await.stop();
    }

    pub async fn status(&self) -> SequencerSnapshot {
        self.sequencer.lock().await.snapshot()
    }

    /// Advances the sequencer to the clock's current reading.
    pub async fn tick(&self) {
        let now = self.clock.now();
        trace!(now_secs = now.as_secs_f64(), "tick");
        self.sequencer.lock().await.tick(now);
    }

    /// Subscribes to the sequencer's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.events.subscribe()
    }

    /// Runs the tick loop until `shutdown` fires (or its sender is dropped).
    ///
    /// The sequencer is initialized first. If that fails the loop still runs so
    /// scheduled and manual starts are refused and logged instead of crashing.
    /// On exit the sequencer is shut down, which stops any run and leaves the
    /// haptic device still.
    pub async fn run_until(&self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        if let Err(e) = self.sequencer.lock().await.initialize() {
            warn!(error = %e, "sequencer failed to initialize");
        }

        let mut interval = tokio::time::interval(self.resolution.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(resolution = ?self.resolution, "engine loop running");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = interval.tick() => self.tick().await,
            }
        }

        self.sequencer.lock().await.shutdown();
        info!("engine loop stopped");
        Ok(())
    }

    /// Runs the engine until Ctrl+C.
    pub async fn run(&self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let engine = self.clone();
        let worker = tokio::spawn(async move { engine.run_until(shutdown_rx).await });

        info!("press Ctrl+C to shut down");
        tokio::signal::ctrl_c().await?;

        info!("shutdown signal received");
        if shutdown_tx.send(()).is_err() {
            error!("engine loop exited before shutdown was requested");
        }
        worker.await??;
        Ok(())
    }
}

impl std::fmt::Debug for PhaselineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaselineEngine")
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::channels::ChannelProbe;
    use crate::phase::PhaseTable;
    use crate::time::ManualClock;

    fn timeline(toml: &str) -> PhaselineConfig {
        PhaselineConfig::from_toml_str(toml).unwrap()
    }

    fn engine(clock: &Arc<ManualClock>) -> PhaselineEngine {
        let table = PhaseTable::from_secs(&[0.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0]);
        let sequencer = PhaseSequencer::new(table, clock.clone());
        PhaselineEngine::new(sequencer, ClockResolution::Custom { ticks_per_second: 200 })
    }

    #[test]
    fn plain_launch_waits_for_the_auto_start_delay() {
        let config = timeline("[timeline]\nauto_start_delay = 4.0\n");
        let plan = LaunchPlan::from_config(&config.timeline, &config.debug);
        assert_eq!(plan.delay, Duration::from_secs(4));
        assert_eq!(plan.action, ScheduledAction::Start);
    }

    #[test]
    fn intro_hands_off_to_the_configured_phase() {
        let config = timeline(
            "[timeline]\nauto_start_delay = 2.0\nintro_duration = 10.0\nintro_handoff_phase = 2\n",
        );
        let plan = LaunchPlan::from_config(&config.timeline, &config.debug);
        assert_eq!(plan.delay, Duration::from_secs(12));
        assert_eq!(plan.action, ScheduledAction::StartAtPhase(PhaseId(2)));
    }

    #[test]
    fn huge_delays_saturate() {
        let config = timeline("[timeline]\nauto_start_delay = 1.0e19\nintro_duration = 1.0e19\n");
        let plan = LaunchPlan::from_config(&config.timeline, &config.debug);
        assert_eq!(plan.delay, Duration::MAX);
    }

    #[test]
    fn debug_mode_skips_delay_and_intro() {
        let config = timeline(
            "[timeline]\nauto_start_delay = 5.0\nintro_duration = 10.0\n[debug]\nenabled = true\nstart_phase = 4\n",
        );
        let plan = LaunchPlan::from_config(&config.timeline, &config.debug);
        assert_eq!(plan.delay, Duration::ZERO);
        assert_eq!(plan.action, ScheduledAction::StartAtPhase(PhaseId(4)));
    }

    #[tokio::test]
    async fn handle_commands_drive_the_shared_sequencer() {
        let clock = ManualClock::shared();
        let engine = engine(&clock);
        let handle = engine.clone();
        engine.sequencer().await.initialize().unwrap();

        handle.jump(PhaseId(3)).await.unwrap();
        clock.set_secs(15.0);
        engine.tick().await;

        let status = handle.status().await;
        assert!(status.running);
        assert_eq!(status.phase, PhaseId(3));
        assert!((status.progress - 0.5).abs() < 1e-4);
        assert_eq!(status.elapsed, Duration::from_secs(75));

        handle.stop().await;
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn run_until_starts_on_schedule_and_shuts_down_cleanly() {
        let clock = ManualClock::shared();
        let engine = engine(&clock);
        let probe = ChannelProbe::new("starfield", clock.clone());
        let reading = probe.reading();
        engine.sequencer().await.register(Box::new(probe));
        let mut events = engine.subscribe();

        let config = PhaselineConfig::default();
        engine.schedule_launch(&config.timeline, &config.debug).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_until(shutdown_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.status().await.running);
        assert!(reading.lock().updates > 0);

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap().unwrap();
        assert!(!engine.status().await.running);

        let mut saw_shutdown = false;
        while let Ok(event) = events.try_recv() {
            if let SequencerEvent::Stopped { reason, .. } = event {
                saw_shutdown = reason == crate::events::StopReason::Shutdown;
            }
        }
        assert!(saw_shutdown);
    }
}
