//! Bounded session-lookup cache.
//!
//! Exec, upload, and resize all need the owning session on their hot path;
//! this cache avoids a storage read per call. Entries evict oldest-first
//! once the bound is reached; deletions from storage are tolerated because
//! the session record is immutable for the fields the provisioner reads.

use std::collections::{HashMap, VecDeque};

use lessoncraft_core::SessionId;
use lessoncraft_store::Session;
use parking_lot::Mutex;

/// Default bound, matching the upstream session cache size.
pub const DEFAULT_CAPACITY: usize = 5000;

/// A bounded insertion-order cache of session records.
pub struct SessionCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    entries: HashMap<SessionId, Session>,
    order: VecDeque<SessionId>,
}

impl SessionCache {
    /// Create a cache holding up to `capacity` sessions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up a cached session.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.inner.lock().entries.get(session_id).cloned()
    }

    /// Insert a session, evicting the oldest entry when full.
    pub fn insert(&self, session: Session) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(session.id, session.clone()).is_none() {
            inner.order.push_back(session.id);
        }
        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Drop a session (e.g. after close).
    pub fn remove(&self, session_id: &SessionId) {
        let mut inner = self.inner.lock();
        inner.entries.remove(session_id);
        inner.order.retain(|id| id != session_id);
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
