//! Utility module
//!
//! This module provides logging setup and small time helpers used
//! throughout the library.

use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Returns `false` if a subscriber was already set.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Whole seconds elapsed between `boot` and `now`, zero if `now` is earlier
pub fn uptime_secs(boot: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(boot).as_secs()
}
