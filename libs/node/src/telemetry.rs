//! Logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the process-wide tracing subscriber.
///
/// Filtering defaults to `info` and follows `RUST_LOG` when set. Safe to call
/// more than once; later calls are no-ops.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = match format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => builder.with_target(false).try_init(),
    };
}
