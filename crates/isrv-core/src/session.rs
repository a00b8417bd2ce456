//! In-memory, TTL-bounded session store.
//!
//! Sessions let a delegate remember facts about a client (e.g. an
//! authorization decision) across the several requests a single image view
//! typically issues (info, then one or more tile/region requests).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque session handle plus the data a delegate attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 8+ character alphanumeric session identifier.
    pub id: String,
    /// Creation time, used to compute expiry.
    pub created_at: DateTime<Utc>,
    /// Arbitrary delegate-attached data.
    pub data: serde_json::Value,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.to_std().map(|a| a >= ttl).unwrap_or(false)
    }
}

/// Generate a fresh session identifier: the first 12 hex characters of a
/// random UUID, satisfying the 8+ character alphanumeric requirement with
/// room to spare.
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// A TTL-keyed, in-memory session store.
///
/// Reads (`get`) take a shared lock and never block on each other; only a
/// concurrent `put`/`evict_expired` contends. Sessions are never written to
/// durable storage — a server restart invalidates all of them.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Construct an empty store with the given per-session time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new session and return its generated ID.
    pub fn put(&self, data: serde_json::Value, now: DateTime<Utc>) -> String {
        let id = generate_session_id();
        let session = Session { id: id.clone(), created_at: now, data };
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .insert(id.clone(), session);
        id
    }

    /// Look up a session by ID, returning `None` if absent or expired.
    ///
    /// An expired entry found here is not evicted inline: eviction is left
    /// to [`SessionStore::evict_expired`] so that `get` never needs the
    /// write lock.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        let guard = self.sessions.read().expect("session store lock poisoned");
        guard
            .get(id)
            .filter(|s| !s.is_expired(now, self.ttl))
            .cloned()
    }

    /// Remove every session whose TTL has elapsed as of `now`. Returns the
    /// number of sessions removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.sessions.write().expect("session store lock poisoned");
        let before = guard.len();
        guard.retain(|_, s| !s.is_expired(now, self.ttl));
        before - guard.len()
    }

    /// Number of sessions currently held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.read().expect("session store lock poisoned").len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
