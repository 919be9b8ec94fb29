use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global subscriber.
///
/// Verbosity comes from `RUST_LOG` and defaults to `info`:
///
/// ```bash
/// RUST_LOG=debug order_service --store memory
/// RUST_LOG=order_service::actors=debug,info order_service
/// ```
///
/// `Compact` prints human-readable lines timed from start-up; `Json` prints
/// one JSON object per event for log shippers.
pub fn setup_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    match format {
        LogFormat::Compact => builder
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .compact()
            .init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }
}
