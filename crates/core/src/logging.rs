//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,trirender_renderer=debug,trirender_rhi=info";

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise a default that
/// keeps the frame loop at `debug`.
///
/// # Example
/// ```no_run
/// trirender_core::init_logging();
/// tracing::info!("Frame loop starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
