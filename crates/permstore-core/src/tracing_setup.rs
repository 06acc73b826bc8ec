//! Tracing subscriber setup.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install a fmt subscriber filtered by `PERMSTORE_LOG`, falling back to
/// `default_level`. Safe to call more than once; only the first call wins.
pub fn init_tracing(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("PERMSTORE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        let installed = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init();
        // The host application may already own the global subscriber.
        if let Err(e) = installed {
            tracing::debug!(error = %e, "tracing subscriber already installed");
        }
    });
}
