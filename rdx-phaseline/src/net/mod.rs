//! The best-effort UDP channel to the external haptic device.
//!
//! - [`protocol`]: the ASCII wire messages.
//! - [`transport`]: socket opening, behind a trait so tests can inject failures.
//! - [`emitter`]: throttling, lazy open, one reopen-and-retry, shutdown.

pub mod emitter;
pub mod protocol;
pub mod transport;

pub use emitter::{EmitterStats, NetworkEmitter};
pub use protocol::HapticMessage;
pub use transport::{Connector, DatagramSocket, NetworkEndpoint, UdpConnector};
