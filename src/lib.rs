#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pub/Sub Dispatch
//!
//! Resilient publish/subscribe dispatch layer for message-broker consumers.
//!
//! ## Overview
//!
//! The dispatcher maintains one live subscriber connection to an external
//! broker, lets independent application modules register handlers for named
//! channels and wildcard patterns at any time (before or after the
//! connection exists), routes incoming messages to the matching handler with
//! per-handler accounting, and autonomously recovers from connection loss
//! with bounded exponential backoff.
//!
//! The broker itself stays outside this crate: it is consumed through the
//! [`broker::BrokerConnector`] / [`broker::BrokerConnection`] capability
//! traits, so any client exposing connect/subscribe/close semantics plugs
//! in. Handlers are equally opaque: the dispatcher only sees the
//! [`registry::ChannelHandler`] and [`registry::PatternHandler`] traits.
//!
//! ## Module Organization
//!
//! - [`dispatcher`] - The long-lived service object: connection lifecycle, event pump, reconnection timers
//! - [`registry`] - Handler registration and per-handler accounting
//! - [`reconnect`] - Reconnection state machine with single-flight guarantee
//! - [`broker`] - Capability contract required from the broker client
//! - [`handlers`] - Built-in reference consumers (key expiry, update notifications)
//! - [`config`] - Configuration with environment overrides
//! - [`status`] - Read-only status snapshot for health checks
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubsub_dispatch::{DispatcherConfig, PubSubDispatcher};
//! use std::sync::Arc;
//!
//! # async fn example(connector: Arc<dyn pubsub_dispatch::BrokerConnector>) -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = PubSubDispatcher::new(connector, DispatcherConfig::default())?;
//!
//! // Registrations may happen before the connection exists; they are
//! // subscribed during the first successful start().
//! // dispatcher.register_channel("user-events", handler, Default::default());
//!
//! dispatcher.initialize().await?;
//! println!("connected: {}", dispatcher.status().connected);
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Semantics
//!
//! Messages are dispatched in the order the connection delivers them, with
//! no ordering between the channel and pattern streams. Delivery is at most
//! once per connection epoch: nothing is persisted or replayed across a
//! reconnect, matching the underlying broker contract.

pub mod broker;
pub mod config;
mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod reconnect;
pub mod registry;
pub mod status;

pub use broker::{BrokerConnection, BrokerConnector, BrokerEvent};
pub use config::{DispatcherConfig, ReconnectPolicy};
pub use dispatcher::PubSubDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use handlers::{KeyExpiryHandler, SessionTerminator, UpdateAcceptor, UpdateNotificationHandler};
pub use logging::init_structured_logging;
pub use registry::{ChannelHandler, HandlerOptions, HandlerRecord, HandlerRegistry, PatternHandler};
pub use status::DispatcherStatus;
