/// Defines the data structures for log records.
pub mod logrecord;
/// Implements a local logger with support for TTY and file output.
pub mod loggerlocal;

use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};

/// Installs a global `tracing` subscriber printing to stdout.
///
/// `RUST_LOG` wins over `default_filter`. Returns `false` when a subscriber
/// was already installed (common in tests).
pub fn init_tracing(default_filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}
