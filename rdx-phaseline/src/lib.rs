//! # Phaseline
//!
//! A timed, multi-channel experience sequencer.
//!
//! An experience is a fixed sequence of timed phases. Phaseline owns the single
//! authoritative timeline: on every tick it works out the current phase and the
//! progress through it, and fans that out to the registered output channels
//! (star field, visual effects, spatial audio) and to a haptic device reached
//! over UDP.
//!
//! ## Core Concepts
//!
//! - **PhaseTable**: Immutable, ordered phase durations. Index 0 is the reserved
//!   "not started" slot.
//! - **PhaseSequencer**: The `Stopped`/`Running` state machine that turns clock
//!   readings into `(phase, progress)` and drives every subsystem in order.
//! - **Subsystem**: The contract an output channel implements: `initialize`,
//!   `update(phase, progress)` and `fade_out(duration)`.
//! - **NetworkEmitter**: Best-effort, throttled `/start`, `/end` and
//!   `/vibration` datagrams. Network trouble never interrupts the experience.
//! - **PhaselineEngine**: The tokio tick loop around the sequencer, plus
//!   scheduled launches (auto-start delay, intro hand-off, debug jump).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use phaseline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     phaseline::logging::init_logging("info");
//!
//!     let config = PhaselineConfig::load(None)?;
//!     let clock = SystemClock::shared();
//!     let engine = PhaselineEngine::from_config(&config, clock.clone());
//!
//!     {
//!         let mut sequencer = engine.sequencer().await;
//!         sequencer.attach(Box::new(ChannelProbe::new("starfield", clock.clone())));
//!     }
//!
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     engine.schedule_launch(&config.timeline, &config.debug).await;
//!     engine.run().await
//! }
//! ```

pub const ENGINE_NAME: &str = "Phaseline";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod haptics;
pub mod logging;
pub mod net;
pub mod phase;
pub mod sequencer;
pub mod time;

/// A prelude module for easy importing of the most common Phaseline types.
pub mod prelude {
    pub use crate::common::{PhaseId, SubsystemId, TaskId};
    pub use crate::components::channels::ChannelProbe;
    pub use crate::components::subsystem::Subsystem;
    pub use crate::components::task::ScheduledAction;
    pub use crate::config::PhaselineConfig;
    pub use crate::engine::{LaunchPlan, PhaselineEngine};
    pub use crate::error::{SequencerError, SubsystemError};
    pub use crate::events::{SequencerEvent, StopReason};
    pub use crate::haptics::{HapticFrame, HapticProfile};
    pub use crate::net::NetworkEmitter;
    pub use crate::phase::PhaseTable;
    pub use crate::sequencer::{PhaseSequencer, SequencerSnapshot};
    pub use crate::time::{Clock, ClockResolution, ManualClock, SharedClock, SystemClock};
}
