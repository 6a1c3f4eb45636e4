//! Circuit breaker coordination.
//!
//! # States
//! - Closed: normal operation, backend eligible for selection
//! - Open: backend suppressed, requests fail over elsewhere
//! - Half-Open: cooled down, waiting for trial successes
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count reaches failure_threshold
//! Half-Open → Open: any failure during trial
//! Open → Half-Open: sweeper, after cooldown_period
//! Half-Open → Closed: trial_success_count reaches trial_requests
//! ```
//!
//! # Design Decisions
//! - Per-backend breaker record, mutated only under the backend's mutex
//! - Selectors offer only Closed backends; Half-Open sees trial traffic
//!   solely through forced/admin retries
//! - The sweeper runs on its own task at a 1-second cadence, independent of
//!   the dispatch path, and exits on the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::BreakerConfig;
use crate::registry::{Backend, BreakerState, Registry};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Drives breaker transitions from dispatch outcome reports and the
/// background cooldown sweep.
pub struct BreakerCoordinator {
    registry: Arc<Registry>,
    settings: BreakerConfig,
}

impl BreakerCoordinator {
    pub fn new(registry: Arc<Registry>, settings: BreakerConfig) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &BreakerConfig {
        &self.settings
    }

    /// Record a failed dispatch attempt against `backend`.
    pub fn report_failure(&self, backend: &Backend) {
        let mut rec = backend.breaker();
        rec.failure_count += 1;

        match rec.state {
            BreakerState::Closed if rec.failure_count >= self.settings.failure_threshold => {
                rec.state = BreakerState::Open;
                rec.open_since = Some(std::time::Instant::now());
                tracing::warn!(
                    backend = %backend.id,
                    failures = rec.failure_count,
                    "Circuit breaker opened"
                );
            }
            BreakerState::HalfOpen => {
                // A single failure during trial re-opens immediately.
                rec.state = BreakerState::Open;
                rec.open_since = Some(std::time::Instant::now());
                tracing::warn!(backend = %backend.id, "Trial failed, circuit breaker re-opened");
            }
            _ => {}
        }
    }

    /// Record a successful dispatch against `backend`.
    pub fn report_success(&self, backend: &Backend) {
        let mut rec = backend.breaker();

        match rec.state {
            BreakerState::Closed => {
                rec.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                rec.trial_success_count += 1;
                if rec.trial_success_count >= self.settings.trial_requests {
                    rec.state = BreakerState::Closed;
                    rec.failure_count = 0;
                    rec.trial_success_count = 0;
                    rec.open_since = None;
                    tracing::info!(backend = %backend.id, "Circuit breaker closed after trial");
                }
            }
            // Selectors skip Open backends, so no success can legitimately
            // arrive here.
            BreakerState::Open => {}
        }
    }

    /// One sweep: promote every cooled-down Open breaker to Half-Open.
    pub fn sweep_once(&self) {
        for backend in self.registry.list() {
            let mut rec = backend.breaker();
            if rec.state != BreakerState::Open {
                continue;
            }
            let cooled = rec
                .open_since
                .map(|since| since.elapsed() >= self.settings.cooldown_period)
                .unwrap_or(true);
            if cooled {
                rec.state = BreakerState::HalfOpen;
                rec.trial_success_count = 0;
                tracing::info!(backend = %backend.id, "Circuit breaker half-open after cooldown");
            }
        }
    }

    /// Background sweeper loop. Runs until the shutdown signal fires.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => self.sweep_once(),
                _ = shutdown.recv() => {
                    tracing::debug!("Breaker sweeper stopping");
                    return;
                }
            }
        }
    }
}
