//! Diagnostic tracing for the agent.
//!
//! Tracing goes to stderr and is meant for debugging. User-facing progress
//! is printed by the console and the status indicator instead.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; without it the filter is `warn`, or `docagent=debug`
/// when `verbose` is set. Model replies and tool payloads only show at `trace`.
///
/// ```bash
/// RUST_LOG=docagent=trace docagent update --non-interactive
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,docagent=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
