//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info,renderer_renderer=debug,renderer_resources=debug";

/// Initialize tracing with the default filter.
///
/// `RUST_LOG` overrides the default when set.
///
/// # Example
/// ```no_run
/// renderer_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Initialize tracing, falling back to `fallback` when `RUST_LOG` is unset.
///
/// Calling this twice is harmless; the second registration is ignored.
pub fn init_logging_with(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
