//! Logging initialization
//!
//! Structured logs go to stdout through a `tracing-subscriber` registry. JSON
//! output is the default so cluster log pipelines can index the `uid`,
//! `namespace` and `name` fields attached to every admission event.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,path_protector=debug,tower=warn,hyper=warn";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human readable output for local runs
    Text,
}

/// Configuration for logging initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directives; falls back to `RUST_LOG`, then [`DEFAULT_LOG_FILTER`]
    pub filter: Option<String>,
}

impl TelemetryConfig {
    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        }
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_explicit_filter_is_used() {
        let config = TelemetryConfig {
            format: LogFormat::Text,
            filter: Some("warn".to_string()),
        };
        assert_eq!(config.env_filter().to_string(), "warn");
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig {
            format: LogFormat::Text,
            filter: Some("off".to_string()),
        };
        // the first call may already have happened in another test
        let _ = init_logging(&config);
        let err = init_logging(&config).unwrap_err();
        assert!(err.to_string().contains("tracing subscriber"));
    }
}
