//! Development-time tracing.
//!
//! Diagnostics only, via `RUST_LOG` to stderr. The project ledger is the
//! record of what happened; nothing here is persisted.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact format on stderr.
/// Fails if a global subscriber is already set.
///
/// # Example
/// ```bash
/// RUST_LOG=workcell=debug,workcell::io::shell=info my-server
/// ```
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .map_err(|err| anyhow!("install tracing subscriber: {err}"))
}
