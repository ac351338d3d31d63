//! Logging setup
//!
//! Log output goes to stderr so command output on stdout can be piped.
//! Formats: pretty (default), compact, json.

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// The `[logging]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format: pretty, compact, json
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the `[logging]` table, which wins over
/// `default_level`. The interactive shell passes WARN so state changes
/// are only narrated by single-shot invocations.
pub fn init_logging(config: Option<&LogConfig>, default_level: Level) {
    let level = config.map_or(default_level, |cfg| parse_level(&cfg.level));
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.map_or("pretty", |cfg| cfg.format.as_str()) {
        "json" => {
            let subscriber = registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        "compact" => {
            let subscriber = registry.with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        _ => {
            let subscriber =
                registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Parses a log level string into a Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
