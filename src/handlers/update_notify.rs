//! # Update-Notification Handler
//!
//! Consumes JSON update notifications, validates their shape, and forwards
//! them to an optional external acceptor. Malformed payloads are warned
//! about and dropped; they never propagate past this handler.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DispatchResult;
use crate::registry::ChannelHandler;

/// Optional downstream consumer of validated update payloads.
///
/// Modeled as an `Option` at the call site: the handler checks for presence
/// before forwarding and merely warns when no acceptor is wired.
#[async_trait]
pub trait UpdateAcceptor: Send + Sync {
    /// Apply one validated update payload
    async fn apply_update(&self, update: Value) -> DispatchResult<()>;
}

/// Handler for JSON update notifications
pub struct UpdateNotificationHandler {
    required_field: String,
    acceptor: Option<Arc<dyn UpdateAcceptor>>,
}

impl UpdateNotificationHandler {
    /// Create a handler requiring `required_field` to be a JSON array
    pub fn new(
        required_field: impl Into<String>,
        acceptor: Option<Arc<dyn UpdateAcceptor>>,
    ) -> Self {
        Self {
            required_field: required_field.into(),
            acceptor,
        }
    }
}

#[async_trait]
impl ChannelHandler for UpdateNotificationHandler {
    async fn handle(&self, payload: &str, channel: &str) -> DispatchResult<()> {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    channel = %channel,
                    error = %e,
                    "Dropping update notification with unparseable payload"
                );
                return Ok(());
            }
        };

        match value.get(&self.required_field) {
            Some(Value::Array(_)) => {}
            Some(_) => {
                warn!(
                    channel = %channel,
                    field = %self.required_field,
                    "Dropping update notification: field is not an array"
                );
                return Ok(());
            }
            None => {
                warn!(
                    channel = %channel,
                    field = %self.required_field,
                    "Dropping update notification: required field missing"
                );
                return Ok(());
            }
        }

        match &self.acceptor {
            Some(acceptor) => {
                debug!(channel = %channel, "Forwarding validated update");
                if let Err(e) = acceptor.apply_update(value).await {
                    warn!(channel = %channel, error = %e, "Update acceptor rejected payload");
                }
            }
            None => {
                warn!(channel = %channel, "No update acceptor configured; dropping validated update");
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "update_notify"
    }
}
