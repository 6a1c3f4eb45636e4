//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch engine → Telemetry::emit_packet
//!     → packet ring buffer (rolling 200, served by /api/packets)
//!     → event bus broadcast (SSE subscribers, lossy per subscriber)
//! Dispatch engine → Telemetry::record_request
//!     → balancer-wide counters (served by /api/metrics)
//! Admin handlers → Telemetry::publish (system events)
//! ```
//!
//! # Design Decisions
//! - Emission never blocks dispatch: the ring is a short mutex hold, the
//!   bus send is non-blocking and lagging subscribers lose events
//! - Request ids are a process-wide monotonic counter, `pkt-N`

pub mod events;
pub mod packets;
pub mod stats;

pub use events::{EventBus, EventKind, SystemEvent};
pub use packets::{PacketEvent, PacketLog, PacketStatus};
pub use stats::{LbStats, LbStatsSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// Facade over the packet ring, the event bus, and the request stats.
pub struct Telemetry {
    bus: EventBus,
    packets: PacketLog,
    stats: LbStats,
    packet_counter: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            bus: EventBus::new(100),
            packets: PacketLog::new(200),
            stats: LbStats::new(),
            packet_counter: AtomicU64::new(0),
        }
    }

    /// Next monotonically unique request identifier.
    pub fn next_request_id(&self) -> String {
        let id = self.packet_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("pkt-{id}")
    }

    /// Record a dispatch event and broadcast it to live subscribers inside
    /// a `packet`-typed envelope.
    pub fn emit_packet(&self, event: PacketEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => self.bus.publish(EventKind::Packet, json),
            Err(error) => tracing::error!(%error, "Failed to encode packet event"),
        }
        self.packets.record(event);
    }

    /// Record a completed or failed request for the metrics snapshot.
    pub fn record_request(&self, server_id: &str, response_ms: f64, is_error: bool) {
        self.stats.record_request(server_id, response_ms, is_error);
    }

    /// Publish a typed system event.
    pub fn publish(&self, kind: EventKind, message: impl Into<String>) {
        self.bus.publish(kind, message.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.bus.subscribe()
    }

    pub fn recent_packets(&self, limit: usize) -> Vec<PacketEvent> {
        self.packets.recent(limit)
    }

    pub fn stats_snapshot(&self) -> LbStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
