//! # Pub/Sub Dispatcher Service
//!
//! The long-lived service object owning the broker connection lifecycle.
//! Constructed once at process start and passed by reference to any
//! component that needs to register handlers; there is no ambient global.
//!
//! ## Connection lifecycle
//!
//! `start()` tears down any previous connection, opens a fresh one through
//! the injected [`BrokerConnector`], and on success performs a full
//! re-subscription sweep over the registry before the event pump begins
//! feeding the dispatch engine. Connection loss feeds the reconnection state
//! machine, which arms a single backoff timer per loss (2s, 4s, 8s, 16s,
//! 30s, 30s, ... up to the configured attempt ceiling).
//!
//! ## Epochs
//!
//! Each `start()` call begins a new connection epoch. The event pump and any
//! pending reconnect timer carry the epoch they were created under and go
//! inert the moment it is superseded, so a dying connection can neither
//! dispatch stale messages nor trigger spurious reconnects after its
//! replacement is live.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerConnection, BrokerConnector, BrokerEvent};
use crate::config::DispatcherConfig;
use crate::dispatch::DispatchEngine;
use crate::error::DispatchResult;
use crate::registry::{ChannelHandler, HandlerOptions, HandlerRegistry, PatternHandler};
use crate::reconnect::ReconnectState;
use crate::status::{ConnectionStatus, DispatcherStatus};

/// Shared mutable core.
///
/// Connection events and registration calls arrive from different tasks, so
/// the registry, connection status, and reconnection state form a single
/// critical section behind one mutex. The lock is never held across an
/// await point.
pub(crate) struct CoreState {
    pub(crate) registry: HandlerRegistry,
    pub(crate) status: ConnectionStatus,
    pub(crate) reconnect: ReconnectState,
    /// Bumped on every `start()` and `stop()`; stale pumps and timers check it
    pub(crate) epoch: u64,
    pub(crate) shutting_down: bool,
    pub(crate) connection: Option<Arc<dyn BrokerConnection>>,
}

impl CoreState {
    pub(crate) fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            status: ConnectionStatus::default(),
            reconnect: ReconnectState::new(),
            epoch: 0,
            shutting_down: false,
            connection: None,
        }
    }
}

struct DispatcherInner {
    connector: Arc<dyn BrokerConnector>,
    config: DispatcherConfig,
    core: Arc<Mutex<CoreState>>,
    engine: DispatchEngine,
}

/// Resilient pub/sub dispatcher
///
/// Cheap to clone; clones share the same core state and connection.
#[derive(Clone)]
pub struct PubSubDispatcher {
    inner: Arc<DispatcherInner>,
}

impl PubSubDispatcher {
    /// Create a dispatcher over the given broker connector
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        config: DispatcherConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;
        let core = Arc::new(Mutex::new(CoreState::new()));
        let engine = DispatchEngine::new(Arc::clone(&core));

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                connector,
                config,
                core,
                engine,
            }),
        })
    }

    /// The dispatcher's configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Register a handler for an exact channel.
    ///
    /// Registration is synchronous and always succeeds. If a connection is
    /// currently live, the subscribe call is issued as a separate
    /// fire-and-forget task whose failure is only logged. The next
    /// reconnect sweep retries the entry regardless.
    pub fn register_channel(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ChannelHandler>,
        options: HandlerOptions,
    ) {
        let name = name.into();
        let live = {
            let mut core = self.inner.core.lock();
            core.registry.insert_channel(&name, handler, options);
            if core.status.connected {
                core.connection.clone()
            } else {
                None
            }
        };

        if let Some(conn) = live {
            let channel = name;
            tokio::spawn(async move {
                if let Err(e) = conn.subscribe(&channel).await {
                    warn!(
                        channel = %channel,
                        error = %e,
                        "Live channel subscribe failed; entry retries on the next reconnect sweep"
                    );
                }
            });
        }
    }

    /// Register a handler for a wildcard pattern
    pub fn register_pattern(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn PatternHandler>,
        options: HandlerOptions,
    ) {
        let pattern = pattern.into();
        let live = {
            let mut core = self.inner.core.lock();
            core.registry.insert_pattern(&pattern, handler, options);
            if core.status.connected {
                core.connection.clone()
            } else {
                None
            }
        };

        if let Some(conn) = live {
            tokio::spawn(async move {
                if let Err(e) = conn.subscribe_pattern(&pattern).await {
                    warn!(
                        pattern = %pattern,
                        error = %e,
                        "Live pattern subscribe failed; entry retries on the next reconnect sweep"
                    );
                }
            });
        }
    }

    /// Remove a channel registration. Messages already dispatched are
    /// unaffected; later deliveries on the channel are ignored.
    pub fn unregister_channel(&self, name: &str) -> bool {
        self.inner.core.lock().registry.remove_channel(name)
    }

    /// Remove a pattern registration
    pub fn unregister_pattern(&self, pattern: &str) -> bool {
        self.inner.core.lock().registry.remove_pattern(pattern)
    }

    /// Bring the dispatcher up, entering the reconnection loop on failure.
    ///
    /// A failed first connect is not fatal: it is logged and the backoff
    /// schedule takes over, exactly as if an established connection had
    /// dropped.
    pub async fn initialize(&self) -> DispatchResult<()> {
        match self.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Initial broker connection failed; entering reconnection loop");
                let epoch = self.inner.core.lock().epoch;
                self.signal_connection_lost(epoch);
                Ok(())
            }
        }
    }

    /// Open a fresh broker connection, replacing any previous one.
    ///
    /// On success: marks the status connected, resets the reconnection
    /// attempt counter, starts the event pump, and re-subscribes every
    /// registered channel and pattern. On failure: counts the error and
    /// propagates it without leaving a half-open connection behind.
    pub async fn start(&self) -> DispatchResult<()> {
        // Tear down any previous connection fully before creating a new one.
        let (old, epoch) = {
            let mut core = self.inner.core.lock();
            core.shutting_down = false;
            core.epoch += 1;
            (core.connection.take(), core.epoch)
        };
        if let Some(conn) = old {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Closing previous broker connection failed (ignored)");
            }
        }

        info!("Connecting subscriber to message broker");
        let (conn, events) = match self.inner.connector.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                {
                    let mut core = self.inner.core.lock();
                    core.status.connected = false;
                    core.status.error_count += 1;
                }
                error!(error = %e, "Broker connection failed");
                return Err(e);
            }
        };

        let (channels, patterns) = {
            let mut core = self.inner.core.lock();
            core.connection = Some(Arc::clone(&conn));
            core.status.connected = true;
            core.status.last_connected_at = Some(Utc::now());
            core.reconnect.connected();
            (core.registry.channel_names(), core.registry.pattern_names())
        };

        info!(
            channels = channels.len(),
            patterns = patterns.len(),
            "Broker connection established; starting event pump"
        );

        let pump = self.clone();
        tokio::spawn(async move { pump.run_event_pump(events, epoch).await });

        self.resubscribe_all(&conn, &channels, &patterns).await;
        Ok(())
    }

    /// Tear down the connection and disarm any pending reconnect. Idempotent;
    /// loss signals arriving during or after shutdown are no-ops.
    pub async fn stop(&self) {
        let old = {
            let mut core = self.inner.core.lock();
            core.shutting_down = true;
            core.epoch += 1;
            core.reconnect.reset();
            core.status.connected = false;
            core.connection.take()
        };

        if let Some(conn) = old {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Closing broker connection during shutdown failed (ignored)");
            }
        }

        info!("Dispatcher stopped");
    }

    /// Read-only status snapshot for health checks and dashboards
    pub fn status(&self) -> DispatcherStatus {
        let core = self.inner.core.lock();
        DispatcherStatus {
            connected: core.status.connected,
            last_connected_at: core.status.last_connected_at,
            total_messages: core.status.total_messages,
            error_count: core.status.error_count,
            reconnect_attempts: core.reconnect.attempt(),
            reconnecting: core.reconnect.in_flight(),
            exhausted: core.reconnect.is_exhausted(),
            channels: core.registry.channel_names(),
            patterns: core.registry.pattern_names(),
            channel_message_counts: core.registry.channel_message_counts(),
            pattern_message_counts: core.registry.pattern_message_counts(),
        }
    }

    /// Subscribe every registered channel, then every registered pattern.
    /// Per-entry failures are logged and left for the next sweep; order
    /// within each set is unspecified.
    async fn resubscribe_all(
        &self,
        conn: &Arc<dyn BrokerConnection>,
        channels: &[String],
        patterns: &[String],
    ) {
        for channel in channels {
            if let Err(e) = conn.subscribe(channel).await {
                warn!(
                    channel = %channel,
                    error = %e,
                    "Channel subscription failed; entry retries on the next reconnect sweep"
                );
            }
        }
        for pattern in patterns {
            if let Err(e) = conn.subscribe_pattern(pattern).await {
                warn!(
                    pattern = %pattern,
                    error = %e,
                    "Pattern subscription failed; entry retries on the next reconnect sweep"
                );
            }
        }
    }

    /// Drain one connection epoch's event stream into the dispatch engine
    async fn run_event_pump(self, mut events: mpsc::Receiver<BrokerEvent>, epoch: u64) {
        while let Some(event) = events.recv().await {
            if self.is_stale(epoch) {
                debug!(epoch, "Dropping event from superseded connection epoch");
                return;
            }

            match event {
                BrokerEvent::Connected => {
                    // transport-level notice; logical reconnects (with their
                    // re-subscription sweep) go through start()
                    let mut core = self.inner.core.lock();
                    core.status.connected = true;
                    core.status.last_connected_at = Some(Utc::now());
                    drop(core);
                    debug!("Transport reported connected");
                }
                BrokerEvent::Error(message) => {
                    {
                        let mut core = self.inner.core.lock();
                        core.status.connected = false;
                        core.status.error_count += 1;
                    }
                    warn!(error = %message, "Broker connection error");
                    self.signal_connection_lost(epoch);
                }
                BrokerEvent::Closed => {
                    // a clean close arrives without a preceding error
                    self.inner.core.lock().status.connected = false;
                    warn!("Broker connection closed");
                    self.signal_connection_lost(epoch);
                }
                BrokerEvent::Message { channel, payload } => {
                    self.inner.engine.on_channel_message(&channel, &payload).await;
                }
                BrokerEvent::PatternMessage {
                    pattern,
                    channel,
                    payload,
                } => {
                    self.inner
                        .engine
                        .on_pattern_message(&pattern, &channel, &payload)
                        .await;
                }
            }
        }

        // sender dropped: the underlying stream is gone
        if !self.is_stale(epoch) {
            self.inner.core.lock().status.connected = false;
            warn!("Broker event stream ended");
            self.signal_connection_lost(epoch);
        }
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.inner.core.lock().epoch != epoch
    }

    /// Feed a connection-loss signal into the reconnection state machine.
    ///
    /// No-op while shutting down, for superseded epochs, and while an
    /// attempt is already pending or active (single-flight). Arms one
    /// backoff timer otherwise; hitting the attempt ceiling is terminal and
    /// logged at error severity for operators.
    fn signal_connection_lost(&self, epoch: u64) {
        let (attempt, delay) = {
            let mut core = self.inner.core.lock();
            if core.shutting_down {
                debug!("Connection loss during shutdown ignored");
                return;
            }
            if core.epoch != epoch {
                debug!(epoch, "Connection loss from superseded epoch ignored");
                return;
            }
            if core.reconnect.in_flight() {
                debug!("Reconnection already pending; duplicate loss signal ignored");
                return;
            }
            match core.reconnect.schedule(&self.inner.config.reconnect) {
                Some(scheduled) => scheduled,
                None => {
                    error!(
                        attempts = core.reconnect.attempt(),
                        "Reconnection attempts exhausted; dispatcher stays down until an external restart"
                    );
                    return;
                }
            }
        };

        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection attempt"
        );

        let this = self.clone();
        tokio::spawn(async move { this.run_reconnect_timer(epoch, delay).await });
    }

    /// Sleep out the backoff delay, then run one reconnection attempt
    async fn run_reconnect_timer(self, epoch: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        {
            let mut core = self.inner.core.lock();
            // a shutdown or manual start() disarms the timer
            if core.shutting_down || core.epoch != epoch || !core.reconnect.is_scheduled() {
                debug!("Reconnect timer disarmed");
                return;
            }
            core.reconnect.attempting();
        }

        info!("Attempting broker reconnection");
        match self.start().await {
            Ok(()) => {
                // attempt counter reset and Idle transition happen on the
                // successful-connect path inside start()
                info!("Reconnection succeeded");
            }
            Err(e) => {
                let current_epoch = {
                    let mut core = self.inner.core.lock();
                    core.reconnect.attempt_failed();
                    core.epoch
                };
                warn!(error = %e, "Reconnection attempt failed");
                self.signal_connection_lost(current_epoch);
            }
        }
    }
}

impl std::fmt::Debug for PubSubDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("PubSubDispatcher")
            .field("connected", &core.status.connected)
            .field("epoch", &core.epoch)
            .field("channels", &core.registry.channel_count())
            .field("patterns", &core.registry.pattern_count())
            .finish()
    }
}
