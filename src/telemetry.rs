//! Tracing setup for applications embedding the engine.
//!
//! The library itself only emits `tracing` spans and events; installing a
//! subscriber is the application's choice. [`init_tracing`] is the
//! convenient default: an env-filtered fmt layer, so `RUST_LOG=debug`
//! behaves the way operators expect.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info` when `RUST_LOG` is unset or unparsable. Safe to call
/// more than once; only the first call installs a subscriber.
///
/// # Examples
///
/// ```rust
/// portweave::telemetry::init_tracing();
/// tracing::info!("engine starting");
/// ```
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
