//! Logging initialization.
//!
//! The `LOGGING` config item sets the base level; `-v` flags raise it.
//! `RUST_LOG` overrides both when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::LogLevel;

pub fn init(level: LogLevel, verbose: u8) {
    let directive = match verbose {
        0 => level.as_filter(),
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    // try_init so tests and embedders that already installed a subscriber
    // are left alone.
    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .try_init();
}
