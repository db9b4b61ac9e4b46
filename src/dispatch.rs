//! # Dispatch Engine
//!
//! Routes raw (channel, message) and (pattern, channel, message) tuples from
//! the active connection to the matching registry entry, updating per-handler
//! counters and the global status under the core mutex.
//!
//! Callbacks run behind a fault boundary: a handler that returns an error or
//! panics increments the global error count and nothing else. One
//! misbehaving handler never takes down the dispatcher or its neighbors.

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::dispatcher::CoreState;
use crate::error::DispatchResult;

/// Message router over the shared registry
pub(crate) struct DispatchEngine {
    core: Arc<Mutex<CoreState>>,
}

impl DispatchEngine {
    pub(crate) fn new(core: Arc<Mutex<CoreState>>) -> Self {
        Self { core }
    }

    /// Dispatch a message delivered on an exactly-subscribed channel.
    ///
    /// Unknown channels record nothing: the broker may still deliver for a
    /// handler that was just removed or is mid-resubscribe, and that race is
    /// benign.
    pub(crate) async fn on_channel_message(&self, channel: &str, payload: &str) {
        let handler = {
            let mut core = self.core.lock();
            match core.registry.record_channel_message(channel) {
                Some(handler) => {
                    core.status.total_messages += 1;
                    handler
                }
                None => {
                    debug!(channel = %channel, "Message on unregistered channel ignored");
                    return;
                }
            }
        };

        // lock released: the callback must not serialize other state access
        let outcome = AssertUnwindSafe(handler.handle(payload, channel))
            .catch_unwind()
            .await;
        self.settle(channel, outcome);
    }

    /// Dispatch a message matched by a wildcard pattern subscription
    pub(crate) async fn on_pattern_message(&self, pattern: &str, channel: &str, payload: &str) {
        let handler = {
            let mut core = self.core.lock();
            match core.registry.record_pattern_message(pattern) {
                Some(handler) => {
                    core.status.total_messages += 1;
                    handler
                }
                None => {
                    debug!(pattern = %pattern, channel = %channel, "Message on unregistered pattern ignored");
                    return;
                }
            }
        };

        let outcome = AssertUnwindSafe(handler.handle(payload, channel, pattern))
            .catch_unwind()
            .await;
        self.settle(pattern, outcome);
    }

    /// Apply the fault boundary outcome: failures are counted and logged,
    /// never propagated
    fn settle(
        &self,
        target: &str,
        outcome: Result<DispatchResult<()>, Box<dyn std::any::Any + Send>>,
    ) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.core.lock().status.error_count += 1;
                warn!(target = %target, error = %e, "Handler returned an error");
            }
            Err(panic) => {
                self.core.lock().status.error_count += 1;
                error!(
                    target = %target,
                    panic = %panic_message(panic.as_ref()),
                    "Handler panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
