//! Logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binaries, which call [`init_tracing`] once at startup.
//!
//! Control the log level with the `RUST_LOG` environment variable:
//!
//! ```bash
//! RUST_LOG=debug ru-server
//! RUST_LOG=remote_unpack::server=trace ru-server
//! ```

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`
///
/// `default_directive` (e.g. `"info"`) applies when `RUST_LOG` is unset or
/// invalid. Calling this more than once is harmless; only the first call
/// installs a subscriber.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
