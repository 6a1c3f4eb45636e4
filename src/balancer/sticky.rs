//! Sticky session selector.

use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::{Backend, BreakerState};

/// Maps opaque session identifiers to backends. Entries are overwritten on
/// rebind and never expire; staleness is filtered at read time by checking
/// the bound backend's breaker.
#[derive(Debug, Default)]
pub struct StickySessions {
    sessions: DashMap<String, Arc<Backend>>,
}

impl StickySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend bound to `session_id`, if it is still eligible.
    pub fn get(&self, session_id: &str) -> Option<Arc<Backend>> {
        let backend = self.sessions.get(session_id)?.clone();
        if backend.breaker_state() == BreakerState::Closed {
            Some(backend)
        } else {
            None
        }
    }

    /// Bind (or rebind) a session to a backend.
    pub fn bind(&self, session_id: &str, backend: Arc<Backend>) {
        self.sessions.insert(session_id.to_string(), backend);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_backend_is_returned_while_closed() {
        let sticky = StickySessions::new();
        let backend = Arc::new(Backend::new("a", "localhost", 9001));

        sticky.bind("s1", backend.clone());
        assert_eq!(sticky.get("s1").unwrap().id, "a");
    }

    #[test]
    fn open_breaker_invalidates_the_binding() {
        let sticky = StickySessions::new();
        let backend = Arc::new(Backend::new("a", "localhost", 9001));
        sticky.bind("s1", backend.clone());

        backend.trip_open();
        assert!(sticky.get("s1").is_none());

        // The stale entry is still there and revives once the backend heals.
        backend.reset_closed();
        assert!(sticky.get("s1").is_some());
    }

    #[test]
    fn rebind_overwrites() {
        let sticky = StickySessions::new();
        let a = Arc::new(Backend::new("a", "localhost", 9001));
        let b = Arc::new(Backend::new("b", "localhost", 9002));

        sticky.bind("s1", a);
        sticky.bind("s1", b);
        assert_eq!(sticky.get("s1").unwrap().id, "b");
        assert_eq!(sticky.len(), 1);
    }

    #[test]
    fn unknown_session_misses() {
        let sticky = StickySessions::new();
        assert!(sticky.get("nope").is_none());
    }
}
