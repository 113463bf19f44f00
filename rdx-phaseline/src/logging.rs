//! Tracing setup shared by the dev binary and the shell.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter, e.g. `PHASELINE_LOG=phaseline=debug`.
pub const LOG_ENV: &str = "PHASELINE_LOG";

/// Installs the global `fmt` subscriber.
///
/// `PHASELINE_LOG` wins over `default_directive` when set and parseable. Uses
/// `try_init`, so a second call (tests, an embedding application that already
/// installed a subscriber) is ignored.
pub fn init_logging(default_directive: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
