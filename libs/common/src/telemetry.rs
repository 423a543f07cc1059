//! Tracing subscriber setup shared by the service binaries

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` (default `info`)
///
/// Returns an error if a global subscriber was already installed.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("setting default subscriber failed: {}", e))
}
