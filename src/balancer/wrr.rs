//! Smooth weighted round-robin selector.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::registry::{Backend, BreakerState, Registry};

#[derive(Debug, Default)]
struct WrrState {
    /// Signed accumulator per backend id.
    current: HashMap<String, f64>,
    /// Plain round-robin cursor, used only while all weights are zero.
    fallback_index: usize,
}

/// Smooth weighted round-robin over the eligible backend set.
///
/// Each pick adds every candidate's weight to its accumulator, selects the
/// maximum, and subtracts the total weight from the winner. Over any window
/// the pick distribution tracks the weight vector without long runs on a
/// single backend.
#[derive(Debug)]
pub struct SmoothWrr {
    registry: Arc<Registry>,
    state: Mutex<WrrState>,
}

impl SmoothWrr {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            state: Mutex::new(WrrState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, WrrState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pick the next backend, skipping `exclude` and anything unreachable or
    /// not Closed. Returns None when no candidate remains.
    pub fn pick(&self, exclude: &HashSet<String>) -> Option<Arc<Backend>> {
        let mut state = self.state();
        let backends = self.registry.list();

        let mut candidates = Vec::with_capacity(backends.len());
        for backend in &backends {
            if exclude.contains(&backend.id) {
                state.current.insert(backend.id.clone(), 0.0);
                continue;
            }
            if backend.is_reachable() && backend.breaker_state() == BreakerState::Closed {
                candidates.push(backend.clone());
            }
        }

        // Drop accumulators for backends that left the registry.
        let live: HashSet<&str> = backends.iter().map(|b| b.id.as_str()).collect();
        state.current.retain(|id, _| live.contains(id.as_str()));

        if candidates.is_empty() {
            return None;
        }

        let total: f64 = candidates.iter().map(|b| b.current_weight().max(0.0)).sum();

        if total <= 0.0 {
            // Degenerate weights: plain round-robin over the candidates.
            let index = state.fallback_index % candidates.len();
            state.fallback_index = state.fallback_index.wrapping_add(1);
            for acc in state.current.values_mut() {
                *acc = 0.0;
            }
            return Some(candidates[index].clone());
        }

        let mut winner = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, backend) in candidates.iter().enumerate() {
            let acc = state.current.entry(backend.id.clone()).or_insert(0.0);
            *acc += backend.current_weight().max(0.0);
            // Strict comparison: first-seen wins ties.
            if *acc > best {
                best = *acc;
                winner = i;
            }
        }

        let chosen = candidates[winner].clone();
        if let Some(acc) = state.current.get_mut(&chosen.id) {
            *acc -= total;
        }
        state.fallback_index = 0;

        Some(chosen)
    }
}
