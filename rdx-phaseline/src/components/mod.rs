//! Contains the building blocks the sequencer is assembled from.
//!
//! The subsystem contract and its registry, rate limiting for the network
//! channel, fade envelopes, deferred actions, and the probe channels the
//! binaries use in place of real renderers.

pub mod channels;
pub mod fade;
pub mod subsystem;
pub mod task;
pub mod throttle;
