//! Structured logging setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVE: &str = "cloud_janitor=info";

/// Installs a JSON `tracing` subscriber writing to standard error.
///
/// Standard output is reserved for the report document. `RUST_LOG` overrides
/// the default `cloud_janitor=info` filter. Calling this more than once is a
/// no-op.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(filter)
        .try_init()
        .ok();
}
