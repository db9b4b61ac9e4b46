//! # Broker Capability Contract
//!
//! Minimal trait surface the dispatch layer requires from an external
//! message-broker client. The broker itself (transport, wire protocol,
//! connection semantics) stays outside this crate; implementations adapt a
//! concrete client to these traits.
//!
//! Every call to [`BrokerConnector::connect`] must produce a brand-new
//! connection object together with its own bounded event stream. One such
//! pair is a *reconnection epoch*: after an error the dispatcher discards
//! the pair entirely and asks the connector for a fresh one; connection
//! objects are never reused.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::DispatchResult;

/// Events emitted by a broker connection
///
/// Lifecycle events (`Connected`, `Closed`, `Error`) and both message
/// streams arrive interleaved on a single channel, preserving the order the
/// underlying client delivered them.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// The underlying transport (re-)established its link
    Connected,
    /// The connection closed cleanly, without a preceding error
    Closed,
    /// The connection failed mid-stream
    Error(String),
    /// A message published to an exactly-subscribed channel
    Message { channel: String, payload: String },
    /// A message matched by a wildcard pattern subscription
    PatternMessage {
        pattern: String,
        channel: String,
        payload: String,
    },
}

/// Control surface of one live broker connection
///
/// Subscribe calls may be issued at any time while the connection is live;
/// matching messages are delivered on the event stream returned alongside
/// this handle at connect time.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Subscribe to an exact channel name
    async fn subscribe(&self, channel: &str) -> DispatchResult<()>;

    /// Subscribe to a wildcard channel pattern
    async fn subscribe_pattern(&self, pattern: &str) -> DispatchResult<()>;

    /// Close the connection. Best-effort: callers tolerate failure.
    async fn close(&self) -> DispatchResult<()>;
}

/// Factory for broker connections
///
/// Implementations hold whatever addressing/auth state the client needs and
/// mint one fresh connection per call.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a new connection and return its control handle plus the bounded
    /// event stream that carries lifecycle events and incoming messages
    async fn connect(
        &self,
    ) -> DispatchResult<(Arc<dyn BrokerConnection>, mpsc::Receiver<BrokerEvent>)>;
}
