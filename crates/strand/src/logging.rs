//! Logging setup for binaries built on Strand.
//!
//! Library code only emits `tracing` events. A binary calls [`init`] once
//! at startup to print them.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Does nothing if a subscriber is already installed.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`] with a different fallback filter. Returns `false` if a
/// subscriber was already installed.
pub fn init_with_default(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
