//! Error types for the sequencer and its collaborators.
//!
//! None of these ever escape the tick loop: the sequencer logs them and carries
//! on. They are returned from the public operations so callers (the engine loop,
//! the shell, tests) can see why something was refused.

use std::path::PathBuf;
use thiserror::Error;

use crate::common::PhaseId;

/// Errors raised by the [`PhaseSequencer`](crate::sequencer::PhaseSequencer) itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SequencerError {
    /// `start` or `start_at_phase` was called before `initialize` succeeded.
    #[error("sequencer has not been initialized")]
    NotInitialized,

    /// The phase table has no positive duration to play through.
    #[error("phase table is empty (total duration is zero)")]
    EmptyTimeline,

    /// A requested phase is outside the table. Only returned by strict lookups;
    /// `start_at_phase` clamps instead.
    #[error("phase {phase} is out of range 1..={max}")]
    PhaseOutOfRange { phase: PhaseId, max: usize },
}

/// Errors a subsystem may report from one of its contract methods.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubsystemError {
    /// The subsystem could not prepare its resources.
    #[error("initialization failed: {0}")]
    Initialize(String),

    /// A per-tick update could not be applied.
    #[error("update failed: {0}")]
    Update(String),

    /// The fade could not be scheduled.
    #[error("fade failed: {0}")]
    Fade(String),

    /// The subsystem panicked inside a contract method.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Errors from the UDP path. Transient; the emitter retries once and then drops.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The configured host did not resolve to any socket address.
    #[error("could not resolve {host}:{port}")]
    Unresolvable { host: String, port: u16 },

    /// The socket could not be opened or connected.
    #[error("failed to open socket: {0}")]
    Open(#[source] std::io::Error),

    /// A datagram could not be written.
    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The underlying `config` crate could not read or deserialize a source.
    #[error("failed to load configuration from {path:?}: {source}")]
    Load {
        path: Option<PathBuf>,
        #[source]
        source: config::ConfigError,
    },
}
