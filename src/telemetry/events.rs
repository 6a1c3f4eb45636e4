//! System event bus: bounded history plus lossy pub/sub.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Classification of a system event.
///
/// `Packet` envelopes carry a serialized dispatch event in their message;
/// consumers filter on the type and parse the nested JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Success,
    Warning,
    Error,
    Packet,
}

/// A broadcastable system event.
#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Pub/sub channel with a bounded recent-event history.
///
/// Sends are non-blocking; a subscriber that falls behind loses events
/// (the history and the packet ring still retain them).
pub struct EventBus {
    tx: broadcast::Sender<String>,
    history: Mutex<VecDeque<SystemEvent>>,
    max_history: usize,
}

impl EventBus {
    pub fn new(max_history: usize) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Publish a typed event: recorded in history and broadcast as JSON.
    pub fn publish(&self, kind: EventKind, message: String) {
        let event = SystemEvent {
            kind,
            message,
            timestamp: Utc::now(),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= self.max_history {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        match serde_json::to_string(&event) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(error) => tracing::error!(%error, "Failed to encode system event"),
        }
    }

    /// Most recent events, oldest first, up to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<SystemEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let take = limit.max(1).min(history.len());
        history.iter().skip(history.len() - take).cloned().collect()
    }
}
