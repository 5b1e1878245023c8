//! Tracing initialization for host binaries and tests
//!
//! The library itself only emits `tracing` events; a host application
//! calls [`init`] once at startup to install a subscriber.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted subscriber honoring `RUST_LOG`, defaulting to
/// `info` for this crate and `warn` elsewhere.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,brandmark=info"));

    // Ignore the error if a subscriber is already installed (tests).
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
