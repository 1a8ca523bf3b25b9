// Logging Setup

use std::env;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` selects the filter (default `info`), `LOG_FORMAT=json` switches
/// to JSON lines. Calling this twice only warns.
pub fn configure_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stdout);

    let result = if env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = result {
        tracing::warn!("Failed to initialize logging, it is probably initialized already: {}", e);
    }
    Ok(())
}
