//! # Dispatch Error Types
//!
//! Structured error handling for the dispatch layer using thiserror
//! for typed errors instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Errors surfaced by the dispatch layer
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Broker operation failed: {operation}: {message}")]
    Broker { operation: String, message: String },

    /// Returned by broker adapters for operations on a torn-down connection
    #[error("No live broker connection")]
    NotConnected,

    #[error("Handler failed for {target}: {message}")]
    Handler { target: String, message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DispatchError {
    /// Create a broker error for a named operation
    pub fn broker(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Broker {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a malformed payload error
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to DispatchError
impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::malformed_payload(err.to_string())
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
