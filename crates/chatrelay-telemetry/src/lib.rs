//! Logging setup for chatrelay
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG` or the
//! configured directive

use chatrelay_config::{LogFormat, TelemetryConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize logging from configuration
///
/// `RUST_LOG` takes precedence over the configured filter, which in turn
/// takes precedence over `default_filter`. Output goes to stderr so that
/// streamed completions on stdout stay clean.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: Option<&TelemetryConfig>, default_filter: &str) -> anyhow::Result<()> {
    let configured = config.map_or(default_filter, |c| c.log_filter.as_str());
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), configured);
    let format = config.map(|c| c.format).unwrap_or_default();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt_layer).try_init(),
        LogFormat::Json => registry.with(fmt_layer.json()).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Pick the effective filter, falling back to `info` for invalid directives
fn build_filter(env_override: Option<&str>, configured: &str) -> EnvFilter {
    env_override
        .filter(|directive| !directive.trim().is_empty())
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
