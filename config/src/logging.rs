//! Process-wide logging init: a `tracing_subscriber::fmt` subscriber with an
//! `EnvFilter` defaulting to `info`, controlled by a single env var rather than per-module
//! configuration.

use tracing_subscriber::EnvFilter;

/// Env var consulted first; falls back to the conventional `RUST_LOG`, then `info`.
pub const LOG_ENV_VAR: &str = "OKCVM_LOG";

fn filter_directive() -> String {
    std::env::var(LOG_ENV_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string())
}

/// Installs the global `tracing` subscriber. Safe to call more than once; later calls are
/// no-ops (mirrors `setup_logging`'s idempotent handler guard).
pub fn init() {
    let filter = EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
