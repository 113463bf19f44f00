//! Defines all configuration structures for a Phaseline experience.
//!
//! These structs are deserialized from a TOML file using the `config` crate, with
//! `PHASELINE__SECTION__KEY` environment variables layered on top (for example
//! `PHASELINE__NETWORK__PORT=9100`). Every field has a default, so an empty file
//! is a valid configuration.
//!
//! Invalid values never abort the experience. They are logged and replaced with
//! a safe default at the point where they are turned into runtime types.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::haptics::{HapticProfile, PhaseEnvelope};
use crate::net::emitter::EmitterOptions;
use crate::phase::PhaseTable;
use crate::time::ClockResolution;

/// The top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaselineConfig {
    #[serde(default)]
    pub clock: ClockConfig,

    #[serde(default)]
    pub timeline: TimelineConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub haptics: HapticsConfig,

    /// Output channels the experience expects, in update order.
    #[serde(default = "default_subsystems")]
    pub subsystems: Vec<SubsystemConfig>,
}

/// Tick rate of the engine loop.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClockConfig {
    #[serde(default)]
    pub resolution: ClockResolution,
}

/// Phase durations and the timing of the transitions around them. Seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Ordered durations, entry 0 being the reserved setup slot.
    #[serde(default)]
    pub phase_durations: Vec<f64>,

    /// Total experience length. Split evenly over `phase_count` phases when
    /// `phase_durations` is empty; otherwise only checked against the table.
    #[serde(default)]
    pub total_duration: Option<f64>,

    #[serde(default)]
    pub phase_count: Option<usize>,

    #[serde(default = "default_fade_in")]
    pub fade_in: f64,

    #[serde(default = "default_fade_out")]
    pub fade_out: f64,

    /// Delay between launch and the automatic start.
    #[serde(default)]
    pub auto_start_delay: f64,

    /// Optional intro played before the timeline. When set, the timeline starts
    /// at `intro_handoff_phase` once the intro has run.
    #[serde(default)]
    pub intro_duration: Option<f64>,

    #[serde(default = "default_handoff_phase")]
    pub intro_handoff_phase: usize,
}

/// Debug mode skips the auto-start delay and jumps straight to a phase.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_handoff_phase")]
    pub start_phase: usize,
}

/// Destination and shaping of the haptic datagrams.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    #[serde(default = "default_multiplier")]
    pub intensity_multiplier: f32,

    #[serde(default = "default_multiplier")]
    pub frequency_multiplier: f32,
}

/// Optional per-phase haptic envelopes; `phases[0]` drives phase 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HapticsConfig {
    #[serde(default)]
    pub phases: Vec<PhaseEnvelope>,
}

/// One expected output channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubsystemConfig {
    pub name: String,
}

impl PhaselineConfig {
    /// Loads a configuration file (if given) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("PHASELINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load {
                path: path.map(Path::to_path_buf),
                source,
            })
    }

    /// Parses an inline TOML document. Environment overrides are not applied.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load { path: None, source })
    }

    /// Builds the haptic profile for the configured timeline.
    pub fn haptic_profile(&self) -> HapticProfile {
        let phase_count = self.timeline.phase_table().phase_count();
        if self.haptics.phases.is_empty() {
            HapticProfile::swell(phase_count)
        } else {
            HapticProfile::with_envelopes(phase_count, self.haptics.phases.clone())
        }
    }
}

impl Default for PhaselineConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            timeline: TimelineConfig::default(),
            debug: DebugConfig::default(),
            network: NetworkConfig::default(),
            haptics: HapticsConfig::default(),
            subsystems: default_subsystems(),
        }
    }
}

impl TimelineConfig {
    /// Resolves the effective phase table.
    ///
    /// Explicit durations win. Without them, `total_duration` is split evenly;
    /// without either, the stock six thirty-second phases are used.
    pub fn phase_table(&self) -> PhaseTable {
        if !self.phase_durations.is_empty() {
            let table = PhaseTable::from_secs(&self.phase_durations);
            if let Some(total) = self.total_duration {
                let actual = table.total_duration().as_secs_f64();
                if (actual - total).abs() > 1e-3 {
                    warn!(configured = total, actual, "total_duration disagrees with phase_durations; using the phase table");
                }
            }
            return table;
        }
        match self.total_duration {
            Some(total) => PhaseTable::evenly_split(
                secs("timeline.total_duration", total),
                self.phase_count.unwrap_or(1),
            ),
            None => PhaseTable::from_secs(&default_phase_durations()),
        }
    }

    pub fn fade_in(&self) -> Duration {
        secs("timeline.fade_in", self.fade_in)
    }

    pub fn fade_out(&self) -> Duration {
        secs("timeline.fade_out", self.fade_out)
    }

    pub fn auto_start_delay(&self) -> Duration {
        secs("timeline.auto_start_delay", self.auto_start_delay)
    }

    pub fn intro_duration(&self) -> Option<Duration> {
        self.intro_duration
            .map(|d| secs("timeline.intro_duration", d))
            .filter(|d| !d.is_zero())
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            phase_durations: Vec::new(),
            total_duration: None,
            phase_count: None,
            fade_in: default_fade_in(),
            fade_out: default_fade_out(),
            auto_start_delay: 0.0,
            intro_duration: None,
            intro_handoff_phase: default_handoff_phase(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_phase: default_handoff_phase(),
        }
    }
}

impl NetworkConfig {
    /// Emitter tunables, with unusable multipliers replaced by 1.0.
    pub fn emitter_options(&self) -> EmitterOptions {
        EmitterOptions {
            send_interval: Duration::from_millis(self.send_interval_ms),
            intensity_multiplier: multiplier("network.intensity_multiplier", self.intensity_multiplier),
            frequency_multiplier: multiplier("network.frequency_multiplier", self.frequency_multiplier),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            send_interval_ms: default_send_interval_ms(),
            intensity_multiplier: default_multiplier(),
            frequency_multiplier: default_multiplier(),
        }
    }
}

fn secs(field: &str, value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| {
        warn!(field, value, "invalid duration; using zero");
        Duration::ZERO
    })
}

fn multiplier(field: &str, value: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(field, value, "invalid multiplier; using 1.0");
        1.0
    }
}

// --- Default value functions for serde ---

fn default_phase_durations() -> Vec<f64> {
    vec![0.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0]
}

fn default_subsystems() -> Vec<SubsystemConfig> {
    ["starfield", "visuals", "audio"]
        .into_iter()
        .map(|name| SubsystemConfig {
            name: name.to_string(),
        })
        .collect()
}

fn default_fade_in() -> f64 {
    2.0
}

fn default_fade_out() -> f64 {
    3.0
}

fn default_handoff_phase() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_send_interval_ms() -> u64 {
    100
}

fn default_multiplier() -> f32 {
    1.0
}
