//! # Configuration for the dispatch layer
//!
//! This module provides configuration structures for customizing dispatcher
//! behavior, including the reconnection backoff policy, event buffering, and
//! the key patterns consumed by the built-in handlers.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use std::time::Duration;

/// Backoff policy for automatic reconnection
///
/// Delays double per attempt and are capped: `min(base * 2^attempt, max)`.
/// With the defaults (base 1s, cap 30s) the sequence for attempts 1..5 is
/// 2s, 4s, 8s, 16s, 30s, and 30s thereafter until `max_attempts` is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Base delay in milliseconds before the first doubling
    pub base_delay_ms: u64,

    /// Ceiling for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Total reconnection attempts before giving up permanently
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Compute the delay before the given attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // cap the shift so large attempt counts cannot overflow
        let exponent = attempt.min(20);
        let doubled = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(doubled.min(self.max_delay_ms))
    }
}

/// Configuration for dispatcher behavior
///
/// # Examples
///
/// ```rust
/// use pubsub_dispatch::config::DispatcherConfig;
///
/// let config = DispatcherConfig::new()
///     .with_max_attempts(5)
///     .with_event_buffer_size(256);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.reconnect.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Reconnection backoff policy
    pub reconnect: ReconnectPolicy,

    /// Buffer size for the bounded broker event channel
    pub event_buffer_size: usize,

    /// Pattern for parsing expired scoped keys, with named capture groups
    /// "scope" and "user". Default matches keys like
    /// "voice_timeout:guild123:userA".
    pub expiry_key_pattern: String,

    /// Field the update-notification handler requires to be a JSON array
    pub required_update_field: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            event_buffer_size: 1024,
            expiry_key_pattern: r"^voice_timeout:(?P<scope>[^:]+):(?P<user>[^:]+)$".to_string(),
            required_update_field: "items".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base reconnection delay in milliseconds
    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect.base_delay_ms = delay_ms;
        self
    }

    /// Set the maximum reconnection delay in milliseconds
    pub fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect.max_delay_ms = delay_ms;
        self
    }

    /// Set the reconnection attempt ceiling
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Set the broker event buffer size
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set the expired-key pattern used by the key-expiry handler
    pub fn with_expiry_key_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.expiry_key_pattern = pattern.into();
        self
    }

    /// Set the required array field for the update-notification handler
    pub fn with_required_update_field<S: Into<String>>(mut self, field: S) -> Self {
        self.required_update_field = field.into();
        self
    }

    /// Load configuration overrides from environment variables
    pub fn from_env() -> DispatchResult<Self> {
        let mut config = Self::default();

        if let Ok(attempts) = std::env::var("PUBSUB_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts = attempts.parse().map_err(|e| {
                DispatchError::configuration(format!("Invalid max_attempts: {e}"))
            })?;
        }

        if let Ok(base) = std::env::var("PUBSUB_RECONNECT_BASE_DELAY_MS") {
            config.reconnect.base_delay_ms = base.parse().map_err(|e| {
                DispatchError::configuration(format!("Invalid base_delay_ms: {e}"))
            })?;
        }

        if let Ok(max) = std::env::var("PUBSUB_RECONNECT_MAX_DELAY_MS") {
            config.reconnect.max_delay_ms = max.parse().map_err(|e| {
                DispatchError::configuration(format!("Invalid max_delay_ms: {e}"))
            })?;
        }

        if let Ok(size) = std::env::var("PUBSUB_EVENT_BUFFER_SIZE") {
            config.event_buffer_size = size.parse().map_err(|e| {
                DispatchError::configuration(format!("Invalid event_buffer_size: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> DispatchResult<()> {
        self.compiled_expiry_pattern()?;

        if self.reconnect.max_attempts == 0 {
            return Err(DispatchError::configuration(
                "reconnect.max_attempts must be at least 1",
            ));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(DispatchError::configuration(
                "reconnect.base_delay_ms must be at least 1",
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(DispatchError::configuration(
                "reconnect.max_delay_ms must not be below base_delay_ms",
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(DispatchError::configuration(
                "event_buffer_size must be at least 1",
            ));
        }

        if self.required_update_field.is_empty() {
            return Err(DispatchError::configuration(
                "required_update_field must not be empty",
            ));
        }

        Ok(())
    }

    /// Compile the expired-key pattern regex
    pub fn compiled_expiry_pattern(&self) -> DispatchResult<Regex> {
        Regex::new(&self.expiry_key_pattern).map_err(|e| {
            DispatchError::configuration(format!(
                "Invalid expiry_key_pattern {}: {e}",
                self.expiry_key_pattern
            ))
        })
    }
}
