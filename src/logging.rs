//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Returns `false` when a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
