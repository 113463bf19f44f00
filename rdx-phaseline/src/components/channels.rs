//! Probe channels standing in for real renderers.
//!
//! A [`ChannelProbe`] honours the full subsystem contract without drawing or
//! playing anything: it tracks a level (brightness, volume) that follows the
//! timeline and its fades, and logs what it would render. The dev binary and the
//! shell attach one per configured channel.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::common::PhaseId;
use crate::error::SubsystemError;
use crate::time::SharedClock;

use super::fade::Fade;
use super::subsystem::Subsystem;

/// What a probe last saw, readable from outside the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeReading {
    pub phase: PhaseId,
    pub progress: f32,
    pub updates: u64,
    pub initializations: u64,
}

pub struct ChannelProbe {
    name: String,
    clock: SharedClock,
    fade: Option<Fade>,
    reading: Arc<Mutex<ProbeReading>>,
}

impl ChannelProbe {
    pub fn new(name: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            clock,
            fade: None,
            reading: Arc::new(Mutex::new(ProbeReading::default())),
        }
    }

    /// A handle to the probe's last reading that stays valid after the probe is
    /// boxed and registered.
    pub fn reading(&self) -> Arc<Mutex<ProbeReading>> {
        Arc::clone(&self.reading)
    }

    /// Output level at the current clock reading. Zero before the first run and
    /// after a completed fade-out.
    pub fn level(&self) -> f32 {
        let now = self.clock.now();
        match self.fade {
            Some(fade) => fade.gain(now),
            None if self.reading.lock().initializations > 0 => 1.0,
            None => 0.0,
        }
    }
}

impl Subsystem for ChannelProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), SubsystemError> {
        self.fade = None;
        let mut reading = self.reading.lock();
        reading.initializations += 1;
        reading.phase = PhaseId::SETUP;
        reading.progress = 0.0;
        debug!(channel = %self.name, "channel initialized");
        Ok(())
    }

    fn fade_in(&mut self, duration: Duration) -> Result<(), SubsystemError> {
        self.fade = Some(Fade::fade_in(self.clock.now(), duration));
        Ok(())
    }

    fn update(&mut self, phase: PhaseId, progress: f32) -> Result<(), SubsystemError> {
        {
            let mut reading = self.reading.lock();
            reading.phase = phase;
            reading.progress = progress;
            reading.updates += 1;
        }
        trace!(channel = %self.name, %phase, progress, level = self.level(), "render");
        Ok(())
    }

    fn fade_out(&mut self, duration: Duration) -> Result<(), SubsystemError> {
        let now = self.clock.now();
        self.fade = Some(Fade::fade_out(now, duration));
        debug!(channel = %self.name, ?duration, "fading out");
        Ok(())
    }
}
