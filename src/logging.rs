//! Tracing setup for programs that build plans.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber.
///
/// Log level is controlled by:
/// 1. `debug` sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let filter = if debug {
        EnvFilter::new("decibel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("decibel=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .is_ok()
}
