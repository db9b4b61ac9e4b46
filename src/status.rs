//! # Connection Status and Reporting
//!
//! Process-wide connection accounting plus the read-only snapshot exposed
//! for health checks and dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Live connection accounting, updated by the dispatcher
///
/// `connected` is true only between a successful connect and the next
/// error/close event.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    /// All dispatched messages across every handler
    pub total_messages: u64,
    /// Connection-level and dispatch-level errors observed
    pub error_count: u64,
}

/// Read-only status snapshot for health checks and dashboards
///
/// Intended for observation, not control: mutating dispatcher state goes
/// through the dispatcher's own surface.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub total_messages: u64,
    pub error_count: u64,
    /// Reconnection attempts since the last successful connect
    pub reconnect_attempts: u32,
    /// Whether a reconnection attempt is scheduled or in flight
    pub reconnecting: bool,
    /// Whether automatic recovery has given up permanently
    pub exhausted: bool,
    pub channels: Vec<String>,
    pub patterns: Vec<String>,
    pub channel_message_counts: HashMap<String, u64>,
    pub pattern_message_counts: HashMap<String, u64>,
}

impl DispatcherStatus {
    /// Registered handler counts as (channels, patterns)
    pub fn handler_counts(&self) -> (usize, usize) {
        (self.channels.len(), self.patterns.len())
    }
}
