//! # Handler Registry
//!
//! Registry for message handler management. Holds two independent mappings:
//! exact channel name → handler record and wildcard pattern → handler
//! record. Pure in-memory state with no I/O of its own; it lives inside the
//! dispatcher's single critical section, so it carries no locking.
//!
//! A name may appear as both an exact channel and, coincidentally, as a
//! pattern; the maps never interact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::DispatchResult;

/// Handler for messages on an exactly-subscribed channel
///
/// Callbacks run on the dispatcher's event pump in arrival order. A handler
/// with unbounded latency (network calls to other services) should spawn its
/// own task and return promptly, or it delays every message behind it.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Handle one message delivered on `channel`
    async fn handle(&self, payload: &str, channel: &str) -> DispatchResult<()>;

    /// Handler name for identification in logs
    fn name(&self) -> &str {
        "channel_handler"
    }
}

/// Handler for messages matched by a wildcard pattern subscription
///
/// Same scheduling contract as [`ChannelHandler`]; additionally receives the
/// pattern that matched.
#[async_trait]
pub trait PatternHandler: Send + Sync {
    /// Handle one message delivered on `channel`, matched by `pattern`
    async fn handle(&self, payload: &str, channel: &str, pattern: &str) -> DispatchResult<()>;

    /// Handler name for identification in logs
    fn name(&self) -> &str {
        "pattern_handler"
    }
}

/// Free-form per-registration configuration, passed through untouched
pub type HandlerOptions = HashMap<String, serde_json::Value>;

/// One registered handler and its accounting
pub struct HandlerRecord<H: ?Sized> {
    /// Channel name or pattern this record is keyed by
    pub target: String,
    /// The application-supplied callback
    pub handler: Arc<H>,
    /// Pass-through configuration bag
    pub options: HandlerOptions,
    /// When the handler was registered
    pub registered_at: DateTime<Utc>,
    /// Messages successfully dispatched to this handler
    pub message_count: u64,
    /// Timestamp of the most recent dispatch
    pub last_message_at: Option<DateTime<Utc>>,
}

impl<H: ?Sized> HandlerRecord<H> {
    fn new(target: impl Into<String>, handler: Arc<H>, options: HandlerOptions) -> Self {
        Self {
            target: target.into(),
            handler,
            options,
            registered_at: Utc::now(),
            message_count: 0,
            last_message_at: None,
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for HandlerRecord<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("target", &self.target)
            .field("handler", &"<Arc<dyn Handler>>".to_string())
            .field("options", &self.options)
            .field("registered_at", &self.registered_at)
            .field("message_count", &self.message_count)
            .field("last_message_at", &self.last_message_at)
            .finish()
    }
}

/// Registry of channel and pattern handlers
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    channels: HashMap<String, HandlerRecord<dyn ChannelHandler>>,
    patterns: HashMap<String, HandlerRecord<dyn PatternHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the handler for an exact channel.
    ///
    /// Overwriting replaces the record wholesale: counters start over and
    /// never resurrect from a removed entry.
    pub fn insert_channel(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ChannelHandler>,
        options: HandlerOptions,
    ) {
        let name = name.into();
        debug!(channel = %name, handler = handler.name(), "Registered channel handler");
        self.channels
            .insert(name.clone(), HandlerRecord::new(name, handler, options));
    }

    /// Store or overwrite the handler for a wildcard pattern
    pub fn insert_pattern(
        &mut self,
        pattern: impl Into<String>,
        handler: Arc<dyn PatternHandler>,
        options: HandlerOptions,
    ) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, handler = handler.name(), "Registered pattern handler");
        self.patterns
            .insert(pattern.clone(), HandlerRecord::new(pattern, handler, options));
    }

    /// Remove a channel registration. In-flight messages already dispatched
    /// are unaffected; later deliveries on the channel are ignored.
    pub fn remove_channel(&mut self, name: &str) -> bool {
        self.channels.remove(name).is_some()
    }

    /// Remove a pattern registration
    pub fn remove_pattern(&mut self, pattern: &str) -> bool {
        self.patterns.remove(pattern).is_some()
    }

    /// Names of all registered channels, for the re-subscription sweep
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// All registered patterns, for the re-subscription sweep
    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    /// Number of registered channel handlers
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of registered pattern handlers
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Record a dispatch to a channel handler, returning the callback to
    /// invoke. `None` means the channel has no registration (a benign race
    /// during removal or reconnect) and nothing was recorded.
    pub fn record_channel_message(&mut self, channel: &str) -> Option<Arc<dyn ChannelHandler>> {
        let record = self.channels.get_mut(channel)?;
        record.message_count += 1;
        record.last_message_at = Some(Utc::now());
        Some(Arc::clone(&record.handler))
    }

    /// Record a dispatch to a pattern handler, returning the callback
    pub fn record_pattern_message(&mut self, pattern: &str) -> Option<Arc<dyn PatternHandler>> {
        let record = self.patterns.get_mut(pattern)?;
        record.message_count += 1;
        record.last_message_at = Some(Utc::now());
        Some(Arc::clone(&record.handler))
    }

    /// Per-channel dispatched message counts
    pub fn channel_message_counts(&self) -> HashMap<String, u64> {
        self.channels
            .iter()
            .map(|(name, record)| (name.clone(), record.message_count))
            .collect()
    }

    /// Per-pattern dispatched message counts
    pub fn pattern_message_counts(&self) -> HashMap<String, u64> {
        self.patterns
            .iter()
            .map(|(pattern, record)| (pattern.clone(), record.message_count))
            .collect()
    }

    /// Look up a channel record (accounting fields included)
    pub fn channel_record(&self, name: &str) -> Option<&HandlerRecord<dyn ChannelHandler>> {
        self.channels.get(name)
    }

    /// Look up a pattern record
    pub fn pattern_record(&self, pattern: &str) -> Option<&HandlerRecord<dyn PatternHandler>> {
        self.patterns.get(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl ChannelHandler for NoopHandler {
        async fn handle(&self, _payload: &str, _channel: &str) -> DispatchResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PatternHandler for NoopHandler {
        async fn handle(
            &self,
            _payload: &str,
            _channel: &str,
            _pattern: &str,
        ) -> DispatchResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.insert_channel("user-events", Arc::new(NoopHandler), HandlerOptions::new());
        registry.insert_pattern("cache:*", Arc::new(NoopHandler), HandlerOptions::new());

        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.pattern_count(), 1);
        assert_eq!(registry.channel_names(), vec!["user-events".to_string()]);
        assert_eq!(registry.pattern_names(), vec!["cache:*".to_string()]);

        let record = registry.channel_record("user-events").unwrap();
        assert_eq!(record.message_count, 0);
        assert!(record.last_message_at.is_none());
    }

    #[test]
    fn test_record_message_bumps_counters() {
        let mut registry = HandlerRegistry::new();
        registry.insert_channel("user-events", Arc::new(NoopHandler), HandlerOptions::new());

        assert!(registry.record_channel_message("user-events").is_some());
        assert!(registry.record_channel_message("user-events").is_some());

        let record = registry.channel_record("user-events").unwrap();
        assert_eq!(record.message_count, 2);
        assert!(record.last_message_at.is_some());
    }

    #[test]
    fn test_unknown_channel_records_nothing() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.record_channel_message("ghost").is_none());
        assert!(registry.record_pattern_message("ghost:*").is_none());
    }

    #[test]
    fn test_overwrite_resets_counters() {
        let mut registry = HandlerRegistry::new();
        registry.insert_channel("user-events", Arc::new(NoopHandler), HandlerOptions::new());
        registry.record_channel_message("user-events");
        assert_eq!(
            registry.channel_record("user-events").unwrap().message_count,
            1
        );

        registry.insert_channel("user-events", Arc::new(NoopHandler), HandlerOptions::new());
        assert_eq!(
            registry.channel_record("user-events").unwrap().message_count,
            0
        );
    }

    #[test]
    fn test_remove() {
        let mut registry = HandlerRegistry::new();
        registry.insert_channel("user-events", Arc::new(NoopHandler), HandlerOptions::new());

        assert!(registry.remove_channel("user-events"));
        assert!(!registry.remove_channel("user-events"));
        assert!(registry.record_channel_message("user-events").is_none());
    }

    #[test]
    fn test_same_name_in_both_maps() {
        let mut registry = HandlerRegistry::new();
        registry.insert_channel("events", Arc::new(NoopHandler), HandlerOptions::new());
        registry.insert_pattern("events", Arc::new(NoopHandler), HandlerOptions::new());

        registry.record_channel_message("events");

        assert_eq!(registry.channel_record("events").unwrap().message_count, 1);
        assert_eq!(registry.pattern_record("events").unwrap().message_count, 0);
    }
}
