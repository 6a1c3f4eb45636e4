//! IP-hash selector.

use std::sync::Arc;

use crate::registry::{Backend, BreakerState, Registry};

/// Deterministic backend choice from the client address.
///
/// The CRC32 of the address string indexes into the registry snapshot, so
/// the mapping is stable only while registry membership is stable. Sticky
/// sessions provide the stronger affinity guarantee across churn.
#[derive(Debug)]
pub struct IpHash {
    registry: Arc<Registry>,
}

impl IpHash {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The backend this client address hashes to, if its breaker is Closed.
    pub fn pick(&self, client_addr: &str) -> Option<Arc<Backend>> {
        let backends = self.registry.list();
        if backends.is_empty() {
            return None;
        }

        let hash = crc32fast::hash(client_addr.as_bytes());
        let index = hash as usize % backends.len();
        let chosen = backends[index].clone();

        if chosen.breaker_state() == BreakerState::Closed {
            Some(chosen)
        } else {
            None
        }
    }
}
