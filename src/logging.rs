//! Logging configuration for MedEase.
//!
//! Logs go to stderr so `compile` output on stdout stays clean. The level
//! comes from `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Initializes the global tracing subscriber.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().with_current_span(false).init(),
    }
}
