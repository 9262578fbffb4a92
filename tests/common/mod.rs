//! Shared helpers for the integration test binaries.

#![allow(dead_code)]

#[cfg(unix)]
mod tools;
#[cfg(unix)]
pub use tools::*;

use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness; `RUST_LOG` picks the level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
