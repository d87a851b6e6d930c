//! Process-wide log verbosity.
//!
//! Logging is configured once per process, never per recognizer. The level
//! scale mirrors the classic recognizer API:
//!
//! | level | output |
//! |-------|--------|
//! | `< 0` | warnings and errors only |
//! | `0`   | info (default) |
//! | `1`   | debug |
//! | `>= 2`| trace |
//!
//! `RUST_LOG`, when set, takes precedence over the numeric level.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber with the given verbosity.
///
/// Returns `false` when a global subscriber was already installed (by us or by
/// the host application); in that case the call has no effect.
pub fn init_logging(level: i32) -> bool {
    let (filter, handle) = reload::Layer::new(filter_for(level));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
    }
    installed
}

/// Change the verbosity at runtime. Initialises logging on first use.
pub fn set_log_level(level: i32) {
    match FILTER_HANDLE.get() {
        Some(handle) => {
            if let Err(e) = handle.reload(filter_for(level)) {
                tracing::warn!("failed to change log level: {e}");
            }
        }
        None => {
            init_logging(level);
        }
    }
}

fn filter_for(level: i32) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive_for(level)))
}

fn directive_for(level: i32) -> &'static str {
    match level {
        l if l < 0 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
