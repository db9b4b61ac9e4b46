use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use pubsub_dispatch::{
    BrokerConnection, BrokerConnector, BrokerEvent, ChannelHandler, DispatchError, DispatchResult,
    PatternHandler,
};

/// Whether a scripted connect call succeeds or fails
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectOutcome {
    Succeed,
    Fail,
}

/// Scripted in-memory broker for driving the dispatcher in tests
///
/// Connect outcomes can be queued per call; once the queue drains, the
/// default outcome applies. Every successful connect mints a fresh
/// [`ScriptedConnection`] whose subscribe calls are recorded and whose event
/// stream the test feeds directly.
pub struct ScriptedBroker {
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
    default_outcome: ConnectOutcome,
    connect_attempts: AtomicUsize,
    connections: Mutex<Vec<Arc<ScriptedConnection>>>,
    event_buffer: usize,
}

impl ScriptedBroker {
    /// Broker whose connects succeed unless scripted otherwise
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: ConnectOutcome::Succeed,
            connect_attempts: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            event_buffer: 64,
        })
    }

    /// Broker whose every connect fails
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: ConnectOutcome::Fail,
            connect_attempts: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            event_buffer: 64,
        })
    }

    /// Queue outcomes for the next connect calls, in order
    pub fn script(&self, outcomes: &[ConnectOutcome]) {
        self.outcomes.lock().extend(outcomes.iter().copied());
    }

    /// Total connect calls observed
    pub fn connect_count(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// The most recently minted connection
    pub fn last_connection(&self) -> Arc<ScriptedConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection was established")
    }

    /// Number of successful connects
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

#[async_trait]
impl BrokerConnector for ScriptedBroker {
    async fn connect(
        &self,
    ) -> DispatchResult<(Arc<dyn BrokerConnection>, mpsc::Receiver<BrokerEvent>)> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(self.default_outcome);
        if outcome == ConnectOutcome::Fail {
            return Err(DispatchError::broker("connect", "scripted failure"));
        }

        let (events, receiver) = mpsc::channel(self.event_buffer);
        let conn = Arc::new(ScriptedConnection {
            events,
            subscribed: Mutex::new(Vec::new()),
            pattern_subscribed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().push(Arc::clone(&conn));

        Ok((conn as Arc<dyn BrokerConnection>, receiver))
    }
}

/// One scripted broker connection: records subscriptions, lets the test
/// inject events
pub struct ScriptedConnection {
    events: mpsc::Sender<BrokerEvent>,
    pub subscribed: Mutex<Vec<String>>,
    pub pattern_subscribed: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl ScriptedConnection {
    pub async fn publish(&self, channel: &str, payload: &str) {
        let _ = self
            .events
            .send(BrokerEvent::Message {
                channel: channel.to_string(),
                payload: payload.to_string(),
            })
            .await;
    }

    pub async fn publish_pattern(&self, pattern: &str, channel: &str, payload: &str) {
        let _ = self
            .events
            .send(BrokerEvent::PatternMessage {
                pattern: pattern.to_string(),
                channel: channel.to_string(),
                payload: payload.to_string(),
            })
            .await;
    }

    pub async fn fail(&self, message: &str) {
        let _ = self.events.send(BrokerEvent::Error(message.to_string())).await;
    }

    pub async fn drop_connection(&self) {
        let _ = self.events.send(BrokerEvent::Closed).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times the given channel was subscribed on this connection
    pub fn subscribe_count(&self, channel: &str) -> usize {
        self.subscribed.lock().iter().filter(|c| *c == channel).count()
    }

    /// How many times the given pattern was subscribed on this connection
    pub fn pattern_subscribe_count(&self, pattern: &str) -> usize {
        self.pattern_subscribed
            .lock()
            .iter()
            .filter(|p| *p == pattern)
            .count()
    }
}

#[async_trait]
impl BrokerConnection for ScriptedConnection {
    async fn subscribe(&self, channel: &str) -> DispatchResult<()> {
        if self.is_closed() {
            return Err(DispatchError::NotConnected);
        }
        self.subscribed.lock().push(channel.to_string());
        Ok(())
    }

    async fn subscribe_pattern(&self, pattern: &str) -> DispatchResult<()> {
        if self.is_closed() {
            return Err(DispatchError::NotConnected);
        }
        self.pattern_subscribed.lock().push(pattern.to_string());
        Ok(())
    }

    async fn close(&self) -> DispatchResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Channel handler recording every delivery
#[derive(Default)]
pub struct RecordingChannelHandler {
    pub deliveries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelHandler for RecordingChannelHandler {
    async fn handle(&self, payload: &str, channel: &str) -> DispatchResult<()> {
        self.deliveries
            .lock()
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Pattern handler recording every delivery
#[derive(Default)]
pub struct RecordingPatternHandler {
    pub deliveries: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl PatternHandler for RecordingPatternHandler {
    async fn handle(&self, payload: &str, channel: &str, pattern: &str) -> DispatchResult<()> {
        self.deliveries.lock().push((
            pattern.to_string(),
            channel.to_string(),
            payload.to_string(),
        ));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording_pattern"
    }
}

/// Channel handler that always fails
pub struct FailingChannelHandler;

#[async_trait]
impl ChannelHandler for FailingChannelHandler {
    async fn handle(&self, _payload: &str, channel: &str) -> DispatchResult<()> {
        Err(DispatchError::handler(channel, "simulated handler failure"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
