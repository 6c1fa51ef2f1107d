//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to
//! stderr so command output on stdout stays machine readable.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Build the filter for `config`, preferring `RUST_LOG` when it is set
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed; the existing one
/// is kept.
pub fn init(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr);

    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };

    result.is_ok()
}
