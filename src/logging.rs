//! Logging setup for the command-line binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary so embedding applications keep control of their output.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize stderr logging.
///
/// `RUST_LOG` takes precedence over `level` when it is set. Output goes to
/// stderr because stdout carries instrumented source and JSON reports.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
