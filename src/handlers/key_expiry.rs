//! # Key-Expiry Handler
//!
//! Consumes expired-key notifications. Keys matching the configured
//! scoped-key pattern ("feature:scopeId:userId") trigger a session
//! disconnect through the injected [`SessionTerminator`]; anything else is
//! ignored without error.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::registry::ChannelHandler;

/// Capability for force-disconnecting a session, injected at construction
/// so the dispatch core has no compile-time dependency on the wider
/// application
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    /// Disconnect the user's session within the given scope
    async fn disconnect(&self, scope_id: &str, user_id: &str) -> DispatchResult<()>;
}

/// Handler for expired scoped keys
pub struct KeyExpiryHandler {
    pattern: Regex,
    terminator: Arc<dyn SessionTerminator>,
}

impl KeyExpiryHandler {
    /// Create a handler from an explicit pattern.
    ///
    /// The pattern must expose named capture groups `scope` and `user`.
    pub fn new(pattern: &str, terminator: Arc<dyn SessionTerminator>) -> DispatchResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            DispatchError::configuration(format!("Invalid expiry key pattern {pattern}: {e}"))
        })?;

        let names: Vec<_> = pattern.capture_names().flatten().collect();
        if !names.contains(&"scope") || !names.contains(&"user") {
            return Err(DispatchError::configuration(
                "expiry key pattern requires named capture groups \"scope\" and \"user\"",
            ));
        }

        Ok(Self {
            pattern,
            terminator,
        })
    }

    /// Create a handler from the dispatcher configuration
    pub fn from_config(
        config: &DispatcherConfig,
        terminator: Arc<dyn SessionTerminator>,
    ) -> DispatchResult<Self> {
        Self::new(&config.expiry_key_pattern, terminator)
    }
}

#[async_trait]
impl ChannelHandler for KeyExpiryHandler {
    async fn handle(&self, payload: &str, channel: &str) -> DispatchResult<()> {
        // the payload of an expiry notification is the key name itself
        let Some(caps) = self.pattern.captures(payload) else {
            debug!(key = %payload, "Expired key outside the scoped-key pattern ignored");
            return Ok(());
        };

        // both groups are validated to exist at construction
        let scope_id = caps.name("scope").map(|m| m.as_str()).unwrap_or_default();
        let user_id = caps.name("user").map(|m| m.as_str()).unwrap_or_default();

        debug!(
            channel = %channel,
            scope = %scope_id,
            user = %user_id,
            "Scoped key expired; disconnecting session"
        );

        if let Err(e) = self.terminator.disconnect(scope_id, user_id).await {
            warn!(
                scope = %scope_id,
                user = %user_id,
                error = %e,
                "Session disconnect failed"
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "key_expiry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTerminator {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SessionTerminator for RecordingTerminator {
        async fn disconnect(&self, scope_id: &str, user_id: &str) -> DispatchResult<()> {
            self.calls
                .lock()
                .push((scope_id.to_string(), user_id.to_string()));
            Ok(())
        }
    }

    fn handler_with_recorder() -> (KeyExpiryHandler, Arc<RecordingTerminator>) {
        let terminator = Arc::new(RecordingTerminator::default());
        let handler = KeyExpiryHandler::new(
            r"^feature:(?P<scope>[^:]+):(?P<user>[^:]+)$",
            Arc::clone(&terminator) as Arc<dyn SessionTerminator>,
        )
        .unwrap();
        (handler, terminator)
    }

    #[tokio::test]
    async fn test_matching_key_disconnects_session() {
        let (handler, terminator) = handler_with_recorder();

        handler
            .handle("feature:guild123:userA", "__keyevent@0__:expired")
            .await
            .unwrap();

        assert_eq!(
            terminator.calls.lock().as_slice(),
            &[("guild123".to_string(), "userA".to_string())]
        );
    }

    #[tokio::test]
    async fn test_wrong_segment_count_is_ignored() {
        let (handler, terminator) = handler_with_recorder();

        handler
            .handle("feature:onlyonesegment", "__keyevent@0__:expired")
            .await
            .unwrap();
        handler
            .handle("unrelated_key", "__keyevent@0__:expired")
            .await
            .unwrap();

        assert!(terminator.calls.lock().is_empty());
    }

    #[test]
    fn test_pattern_without_required_groups_is_rejected() {
        let terminator = Arc::new(RecordingTerminator::default());
        let result = KeyExpiryHandler::new(
            r"^feature:(\w+):(\w+)$",
            terminator as Arc<dyn SessionTerminator>,
        );
        assert!(matches!(result, Err(DispatchError::Configuration { .. })));
    }

    #[test]
    fn test_default_config_pattern_compiles() {
        let terminator = Arc::new(RecordingTerminator::default());
        let handler = KeyExpiryHandler::from_config(
            &DispatcherConfig::default(),
            terminator as Arc<dyn SessionTerminator>,
        );
        assert!(handler.is_ok());
    }
}
