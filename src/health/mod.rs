//! Health scoring subsystem.
//!
//! # Data Flow
//! ```text
//! tick (HEALTH_CHECK_INTERVAL)
//!     → registry snapshot
//!     → refresh raw metrics per backend
//!     → H = α(1−cpu) + β(1−mem) + γ(1−lat) + δ(1−err) + ε·reachable
//!     → weight_i = H_i / ΣH  (all zero when ΣH ≤ 0)
//! ```
//!
//! # Design Decisions
//! - The tick never blocks dispatch; it only touches atomic metric fields
//! - Latency is normalized against a 500 ms ceiling
//! - The loop exits promptly on the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::registry::{Backend, Registry};

const ALPHA: f64 = 0.25; // CPU
const BETA: f64 = 0.20; // memory
const GAMMA: f64 = 0.25; // latency
const DELTA: f64 = 0.25; // error rate
const EPSILON: f64 = 0.05; // reachability

/// Latency at or above this many milliseconds scores as fully loaded.
const LATENCY_CEILING_MS: f64 = 500.0;

/// Periodically recomputes every backend's health score and normalized
/// selection weight.
pub struct HealthScorer {
    registry: Arc<Registry>,
    interval: Duration,
}

impl HealthScorer {
    pub fn new(registry: Arc<Registry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Score one backend from its current raw metrics.
    fn score(backend: &Backend) -> f64 {
        let cpu = backend.cpu_usage().clamp(0.0, 1.0);
        let mem = backend.mem_usage().clamp(0.0, 1.0);
        let latency = (backend.response_time() / LATENCY_CEILING_MS).clamp(0.0, 1.0);
        let errors = backend.error_rate().clamp(0.0, 1.0);
        let reachable = if backend.is_reachable() { 1.0 } else { 0.0 };

        let h = ALPHA * (1.0 - cpu)
            + BETA * (1.0 - mem)
            + GAMMA * (1.0 - latency)
            + DELTA * (1.0 - errors)
            + EPSILON * reachable;

        h.max(0.0)
    }

    /// One scorer pass over the registry snapshot.
    pub fn score_once(&self) {
        let backends = self.registry.list();

        for backend in &backends {
            backend.set_health_score(Self::score(backend));
        }

        let sum: f64 = backends.iter().map(|b| b.health_score()).sum();
        if sum > 0.0 {
            for backend in &backends {
                backend.set_current_weight(backend.health_score() / sum);
            }
        } else {
            for backend in &backends {
                backend.set_current_weight(0.0);
            }
        }
    }

    /// Background scoring loop. Runs until the shutdown signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; score right away so
        // selectors have weights before the first full interval elapses.
        loop {
            tokio::select! {
                _ = tick.tick() => self.score_once(),
                _ = shutdown.recv() => {
                    tracing::debug!("Health scorer stopping");
                    return;
                }
            }
        }
    }
}
