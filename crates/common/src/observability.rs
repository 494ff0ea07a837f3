//! Tracing initialization shared by the binary and by integration tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// Reads the filter from `RUST_LOG` (defaulting to `info`); emits JSON when
/// `json` is true, human-readable text otherwise. Safe to call more than
/// once within a test binary — a second call is a no-op.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter);
    let result = if json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = result {
        tracing::trace!(error = %e, "tracing subscriber already initialized");
    }
}
