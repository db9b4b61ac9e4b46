//! # Structured Logging Module
//!
//! Environment-aware structured logging for the dispatch layer. Console
//! output only; embedding applications that install their own subscriber
//! keep it.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_output = std::env::var("PUBSUB_LOG_JSON").is_ok();

        let registry = tracing_subscriber::registry();
        let result = if json_output {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(EnvFilter::new(log_level.clone())),
                )
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(EnvFilter::new(log_level.clone())),
                )
                .try_init()
        };

        // Use try_init to avoid panic if a global subscriber is already set
        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PUBSUB_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment, with RUST_LOG taking precedence
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level;
    }

    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        // RUST_LOG may be set in dev environments; only assert the fallback
        // mapping when it is absent
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(get_log_level("production"), "info");
            assert_eq!(get_log_level("development"), "debug");
            assert_eq!(get_log_level("unknown"), "debug");
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
    }
}
