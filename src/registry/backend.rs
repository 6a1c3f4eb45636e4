//! The per-backend data model.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

/// Circuit breaker state for a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker bookkeeping, always read and written under the backend's mutex.
#[derive(Debug)]
pub struct BreakerRecord {
    pub state: BreakerState,
    pub failure_count: u32,
    pub trial_success_count: u32,
    /// Instant the current Open epoch began. Only meaningful while the
    /// breaker is Open or still cooling down.
    pub open_since: Option<Instant>,
}

impl BreakerRecord {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            trial_success_count: 0,
            open_since: None,
        }
    }
}

/// A single upstream backend.
///
/// Multiple subsystems hold the same `Arc<Backend>` and mutate disjoint
/// fields: the scorer writes metrics and weights, the dispatch engine moves
/// the in-flight counter, the breaker coordinator owns the breaker record.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub host: String,
    pub port: u16,

    // Soft metric fields: f64 bit patterns in whole-word atomics. Readers
    // may observe stale values but never torn ones.
    cpu_usage: AtomicU64,
    mem_usage: AtomicU64,
    /// Observed response latency in milliseconds.
    response_time: AtomicU64,
    error_rate: AtomicU64,
    health_score: AtomicU64,
    current_weight: AtomicU64,

    reachable: AtomicBool,
    in_flight: AtomicI64,
    breaker: Mutex<BreakerRecord>,
}

impl Backend {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            cpu_usage: AtomicU64::new(0.1f64.to_bits()),
            mem_usage: AtomicU64::new(0.1f64.to_bits()),
            response_time: AtomicU64::new(50.0f64.to_bits()),
            error_rate: AtomicU64::new(0.0f64.to_bits()),
            health_score: AtomicU64::new(0.0f64.to_bits()),
            current_weight: AtomicU64::new(0.0f64.to_bits()),
            reachable: AtomicBool::new(true),
            in_flight: AtomicI64::new(0),
            breaker: Mutex::new(BreakerRecord::new()),
        }
    }

    /// `host:port`, the forwarding target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    // Soft metrics

    pub fn cpu_usage(&self) -> f64 {
        f64::from_bits(self.cpu_usage.load(Ordering::Relaxed))
    }

    pub fn set_cpu_usage(&self, value: f64) {
        self.cpu_usage.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn mem_usage(&self) -> f64 {
        f64::from_bits(self.mem_usage.load(Ordering::Relaxed))
    }

    pub fn set_mem_usage(&self, value: f64) {
        self.mem_usage.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Observed latency in milliseconds.
    pub fn response_time(&self) -> f64 {
        f64::from_bits(self.response_time.load(Ordering::Relaxed))
    }

    pub fn set_response_time(&self, millis: f64) {
        self.response_time.store(millis.to_bits(), Ordering::Relaxed);
    }

    pub fn error_rate(&self) -> f64 {
        f64::from_bits(self.error_rate.load(Ordering::Relaxed))
    }

    pub fn set_error_rate(&self, value: f64) {
        self.error_rate.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn health_score(&self) -> f64 {
        f64::from_bits(self.health_score.load(Ordering::Relaxed))
    }

    pub fn set_health_score(&self, value: f64) {
        self.health_score.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn current_weight(&self) -> f64 {
        f64::from_bits(self.current_weight.load(Ordering::Relaxed))
    }

    pub fn set_current_weight(&self, value: f64) {
        self.current_weight.store(value.to_bits(), Ordering::Relaxed);
    }

    // Reachability

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn set_reachable(&self, value: bool) {
        self.reachable.store(value, Ordering::Relaxed);
    }

    // In-flight accounting

    /// Admit a request; returns the post-increment in-flight count.
    pub fn begin_request(&self) -> i64 {
        self.in_flight.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Release a request; returns the post-decrement in-flight count.
    pub fn end_request(&self) -> i64 {
        self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Force the counter to zero (admin toggle/reset).
    pub fn drain_in_flight(&self) {
        self.in_flight.store(0, Ordering::Relaxed);
    }

    // Breaker record

    /// Exclusive access to the breaker record. Poisoning is recovered: the
    /// record stays usable even if a holder panicked.
    pub fn breaker(&self) -> MutexGuard<'_, BreakerRecord> {
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current breaker state, read coherently.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker().state
    }

    /// Force the breaker Open as of now and zero its counters.
    pub fn trip_open(&self) {
        let mut rec = self.breaker();
        rec.state = BreakerState::Open;
        rec.open_since = Some(Instant::now());
        rec.failure_count = 0;
        rec.trial_success_count = 0;
    }

    /// Force the breaker Closed and zero its counters.
    pub fn reset_closed(&self) {
        let mut rec = self.breaker();
        rec.state = BreakerState::Closed;
        rec.open_since = None;
        rec.failure_count = 0;
        rec.trial_success_count = 0;
    }

    /// Serializable point-in-time view for the admin API.
    pub fn snapshot(&self) -> BackendSnapshot {
        let (state, failure_count, trial_success_count) = {
            let rec = self.breaker();
            (rec.state, rec.failure_count, rec.trial_success_count)
        };

        BackendSnapshot {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            address: self.address(),
            cpu_usage: self.cpu_usage(),
            mem_usage: self.mem_usage(),
            response_time: self.response_time(),
            error_rate: self.error_rate(),
            reachable: self.is_reachable(),
            health_score: self.health_score(),
            current_weight: self.current_weight(),
            active_requests: self.in_flight(),
            circuit_breaker_state: state,
            failure_count,
            trial_success_count,
        }
    }
}

/// Point-in-time backend view exposed by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSnapshot {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub address: String,
    pub cpu_usage: f64,
    pub mem_usage: f64,
    pub response_time: f64,
    pub error_rate: f64,
    pub reachable: bool,
    pub health_score: f64,
    pub current_weight: f64,
    pub active_requests: i64,
    pub circuit_breaker_state: BreakerState,
    pub failure_count: u32,
    pub trial_success_count: u32,
}
