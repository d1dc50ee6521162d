// crates/topgun-harness/src/logging.rs
// ============================================================================
// Module: Harness Logging
// Description: Tracing subscriber setup for scenario runs.
// Purpose: Route harness and subprocess output into one filtered sink.
// Dependencies: tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! Installs a `tracing` subscriber that writes through the test writer so
//! subprocess output captured by sessions interleaves with harness events
//! and is only shown for failing tests.
//!
//! `TOPGUN_LOG` overrides the filter (e.g. `debug`, `topgun::session=trace`).
//! When unset the standard `RUST_LOG` variable is honoured, finally
//! defaulting to `info`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the harness log filter.
pub const LOG_ENV: &str = "TOPGUN_LOG";

/// Target used for lines emitted by spawned processes.
pub const SESSION_TARGET: &str = "topgun::session";

/// Installs the harness subscriber. Safe to call from every test; only the
/// first call in a process takes effect.
pub fn init_logging() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let layer = fmt::layer().with_target(true).with_test_writer();

    // A subscriber installed by another test (or the host binary) wins.
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

/// Installs a plain stderr subscriber for the operator CLI.
pub fn init_cli_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
