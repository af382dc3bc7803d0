//! Telemetry initialization: structured logging and metric descriptions

pub mod metrics;

use crate::config::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// An unparsable filter falls back to the default one. Calling this twice
/// panics inside `tracing_subscriber`, so only the binary calls it.
pub fn init(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(TelemetryConfig::default().log_filter));

    metrics::describe_metrics();

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.is_json() {
        // Keep `message` top-level in JSON output
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}
