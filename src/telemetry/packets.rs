//! Dispatch packet events and their rolling history.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle stage of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketStatus {
    Dispatch,
    Rerouted,
    Completed,
    Failed,
}

/// One structured record in the lifecycle of a routed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketEvent {
    pub request_id: String,
    pub attempt: u32,
    pub priority: String,
    pub server_id: String,
    pub server_address: String,
    pub status: PacketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    pub active_requests: i64,
}

impl PacketEvent {
    /// Event for an attempt with no observed latency yet.
    pub fn attempt(
        request_id: &str,
        attempt: u32,
        priority: &str,
        server_id: &str,
        server_address: &str,
        status: PacketStatus,
        active_requests: i64,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            attempt,
            priority: priority.to_string(),
            server_id: server_id.to_string(),
            server_address: server_address.to_string(),
            status,
            reason: None,
            timestamp: Utc::now(),
            response_time: None,
            active_requests,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_response_time(mut self, millis: f64) -> Self {
        self.response_time = Some(millis);
        self
    }
}

/// Bounded FIFO history of packet events.
pub struct PacketLog {
    events: Mutex<VecDeque<PacketEvent>>,
    capacity: usize,
}

impl PacketLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, event: PacketEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events, oldest first, up to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<PacketEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let take = limit.max(1).min(events.len());
        let skip = events.len() - take;
        events.iter().skip(skip).cloned().collect()
    }
}
