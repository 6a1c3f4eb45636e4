//! Backend selection subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch engine → Balancer::pick(request info, exclusion set)
//!     → 1. sticky session lookup (cookie session_id)
//!     → 2. IP-hash routing (X-Forwarded-For / peer address)
//!     → 3. smooth weighted round-robin fallback
//!     → sticky binding recorded for whichever selector produced the pick
//! ```
//!
//! # Design Decisions
//! - Selectors are consulted in strict priority order; each one only offers
//!   backends whose breaker is Closed
//! - The exclusion set (already-attempted backends) is enforced at every
//!   stage so retries always move to a distinct backend
//! - The whole pick runs under the orchestrator's own lock so lookup and
//!   rebind are not interleaved between concurrent dispatches

pub mod ip_hash;
pub mod sticky;
pub mod wrr;

pub use ip_hash::IpHash;
pub use sticky::StickySessions;
pub use wrr::SmoothWrr;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;

use crate::config::RuntimeFlags;
use crate::registry::{Backend, Registry};

/// Routing-relevant facts extracted once per request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Value of the `session_id` cookie; empty disables sticky lookup.
    pub session_id: String,
    /// Client address used for IP hashing.
    pub client_addr: String,
}

impl RequestInfo {
    pub fn from_request(headers: &HeaderMap, peer: SocketAddr) -> Self {
        Self {
            session_id: extract_session_id(headers),
            client_addr: extract_client_addr(headers, peer),
        }
    }
}

/// Composes the sticky, IP-hash, and weighted selectors.
pub struct Balancer {
    sticky: StickySessions,
    ip_hash: IpHash,
    wrr: SmoothWrr,
    flags: Arc<RuntimeFlags>,
    select_lock: Mutex<()>,
}

impl Balancer {
    pub fn new(registry: Arc<Registry>, flags: Arc<RuntimeFlags>) -> Self {
        Self {
            sticky: StickySessions::new(),
            ip_hash: IpHash::new(registry.clone()),
            wrr: SmoothWrr::new(registry),
            flags,
            select_lock: Mutex::new(()),
        }
    }

    pub fn sticky(&self) -> &StickySessions {
        &self.sticky
    }

    /// Choose the backend for this request, honoring the exclusion set.
    ///
    /// Returns None only when every selector comes up empty: no sticky
    /// binding, no IP-hash hit, and no eligible candidate left for WRR.
    pub fn pick(&self, info: &RequestInfo, exclude: &HashSet<String>) -> Option<Arc<Backend>> {
        let _guard = self.select_lock.lock().unwrap_or_else(|e| e.into_inner());

        let sticky_enabled = self.flags.use_sticky_sessions() && !info.session_id.is_empty();

        if sticky_enabled {
            if let Some(backend) = self.sticky.get(&info.session_id) {
                if !exclude.contains(&backend.id) {
                    return Some(backend);
                }
            }
        }

        if self.flags.use_ip_hash() {
            if let Some(backend) = self.ip_hash.pick(&info.client_addr) {
                if !exclude.contains(&backend.id) {
                    if sticky_enabled {
                        self.sticky.bind(&info.session_id, backend.clone());
                    }
                    return Some(backend);
                }
            }
        }

        let chosen = self.wrr.pick(exclude)?;
        if sticky_enabled {
            self.sticky.bind(&info.session_id, chosen.clone());
        }
        Some(chosen)
    }
}

/// Session identifier from the `session_id` cookie; empty when absent.
fn extract_session_id(headers: &HeaderMap) -> String {
    let Some(cookies) = headers.get(axum::http::header::COOKIE) else {
        return String::new();
    };
    let Ok(cookies) = cookies.to_str() else {
        return String::new();
    };

    for pair in cookies.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name == "session_id" {
                return value.to_string();
            }
        }
    }
    String::new()
}

/// Client address: `X-Forwarded-For` when present, else the peer address
/// with the port stripped.
fn extract_client_addr(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    peer.ip().to_string()
}
