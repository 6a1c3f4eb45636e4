//! Backend registry subsystem.
//!
//! # Data Flow
//! ```text
//! Config seeds → Registry (authoritative, ordered set of backends)
//!     → list() snapshots consumed by selectors, scorer, sweeper, API
//!     → per-field mutation by scorer (metrics, weights),
//!       dispatch engine (in-flight), breaker coordinator (breaker record),
//!       admin handlers (reachability, forced resets)
//! ```
//!
//! # Design Decisions
//! - Collection behind a reader/writer lock; readers get a cloned Vec of
//!   Arcs and iterate without holding the lock
//! - Hot counters (in-flight) are atomics; soft metrics are atomic f64 bit
//!   casts; the breaker sub-record has its own per-backend mutex so readers
//!   always observe a coherent breaker state

pub mod backend;

pub use backend::{Backend, BackendSnapshot, BreakerRecord, BreakerState};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Ordered, concurrency-safe collection of backends.
#[derive(Debug, Default)]
pub struct Registry {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl Registry {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends: RwLock::new(backends),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        self.backends.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        self.backends.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all backends in registration order.
    pub fn list(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    /// Replace the entire collection atomically.
    pub fn replace(&self, backends: Vec<Arc<Backend>>) {
        *self.write() = backends;
    }

    /// Register a new backend at the end of the order.
    pub fn add(&self, backend: Arc<Backend>) {
        self.write().push(backend);
    }

    /// Remove a backend by identifier. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut backends = self.write();
        let before = backends.len();
        backends.retain(|b| b.id != id);
        backends.len() != before
    }

    /// Look up a backend by identifier.
    pub fn get(&self, id: &str) -> Option<Arc<Backend>> {
        self.read().iter().find(|b| b.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
