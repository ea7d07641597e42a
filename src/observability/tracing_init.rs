//! Tracing initialization with configurable logging formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig, ObservabilityConfig};

/// Initialize the tracing subscriber with the given configuration.
///
/// This sets up:
/// - Console logging with configurable format (pretty, compact, JSON)
/// - Environment-based log filtering
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TracingError> {
    let logging = &config.logging;
    let filter = build_env_filter(logging);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match (logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        (LogFormat::Pretty, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .without_time(),
            )
            .try_init(),
        (LogFormat::Compact, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        (LogFormat::Compact, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .without_time(),
            )
            .try_init(),
        (LogFormat::Json, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line),
            )
            .try_init(),
        (LogFormat::Json, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(logging.file_line)
                    .with_line_number(logging.file_line)
                    .without_time(),
            )
            .try_init(),
    };

    result.map_err(|e| TracingError::Init(e.to_string()))
}

/// Build the env filter from config, with RUST_LOG taking precedence.
fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = config.level.as_str();

    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{},{}", base_level, filter);
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Default filter that quiets noisy crates
        EnvFilter::new(format!("{},hyper=warn,h2=warn,tower=info", base_level))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_filter_prefers_rust_log() {
        let config = LoggingConfig {
            filter: Some("rolecall=trace".into()),
            ..Default::default()
        };
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            let filter = build_env_filter(&config).to_string();
            assert!(filter.contains("warn"));
            assert!(!filter.contains("rolecall"));
        });
    }

    #[test]
    fn test_filter_combines_level_and_directives() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            filter: Some("rolecall=trace".into()),
            ..Default::default()
        };
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = build_env_filter(&config).to_string();
            assert!(filter.contains("rolecall=trace"));
            assert!(filter.contains("debug"));
        });
    }

    #[test]
    fn test_default_filter_quiets_noisy_crates() {
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = build_env_filter(&LoggingConfig::default()).to_string();
            assert!(filter.contains("hyper=warn"));
            assert!(filter.contains("info"));
        });
    }
}
