//! In-memory HTTP sessions, one store per application.
//!
//! # Design Decisions
//! - Sessions are keyed by a random UUID carried in the `JSESSIONID` cookie
//! - Expiry is checked lazily on lookup; `purge_expired` sweeps the rest
//! - Nothing is persisted; destroying the context drops every session

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::context::attributes::{AttributeChange, AttributeScope};

/// Cookie that carries the session id.
pub const SESSION_COOKIE: &str = "JSESSIONID";

pub struct Session {
    id: String,
    created: SystemTime,
    last_accessed: Mutex<(SystemTime, Instant)>,
    max_inactive: RwLock<Option<Duration>>,
    attributes: AttributeScope,
}

impl Session {
    fn new(max_inactive: Option<Duration>) -> Self {
        let now = SystemTime::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string().to_uppercase(),
            created: now,
            last_accessed: Mutex::new((now, Instant::now())),
            max_inactive: RwLock::new(max_inactive),
            attributes: AttributeScope::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creation_time(&self) -> SystemTime {
        self.created
    }

    pub fn last_accessed_time(&self) -> SystemTime {
        self.last_accessed.lock().0
    }

    /// `None` means the session never expires.
    pub fn max_inactive_interval(&self) -> Option<Duration> {
        *self.max_inactive.read()
    }

    pub fn set_max_inactive_interval(&self, interval: Option<Duration>) {
        *self.max_inactive.write() = interval;
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&self, name: &str, value: Value) -> AttributeChange {
        self.attributes.set(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> AttributeChange {
        self.attributes.remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.names()
    }

    fn touch(&self) {
        *self.last_accessed.lock() = (SystemTime::now(), Instant::now());
    }

    fn is_expired(&self, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.last_accessed.lock().1);
        self.max_inactive_interval().is_some_and(|limit| idle > limit)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("max_inactive", &self.max_inactive_interval())
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    default_timeout: RwLock<Option<Duration>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inactivity limit given to new sessions. `None` disables expiry.
    pub fn set_default_timeout(&self, timeout: Option<Duration>) {
        *self.default_timeout.write() = timeout;
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        *self.default_timeout.read()
    }

    /// Live session `id`, marked as accessed. An expired one is dropped.
    pub fn find(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        if session.is_expired(Instant::now()) {
            self.sessions.remove(id);
            tracing::debug!(session = %id, "Session expired");
            return None;
        }
        session.touch();
        Some(session)
    }

    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.default_timeout()));
        self.sessions.insert(session.id.clone(), Arc::clone(&session));
        tracing::debug!(session = %session.id, "Session created");
        session
    }

    pub fn invalidate(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drop every expired session and return how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_is_found_and_touched() {
        let store = SessionStore::new();
        let session = store.create();
        session.set_attribute("user", Value::from("ada"));
        let first_access = session.last_accessed_time();

        std::thread::sleep(Duration::from_millis(5));
        let found = store.find(session.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert_eq!(found.attribute("user"), Some(Value::from("ada")));
        assert!(found.last_accessed_time() > first_access);
        assert!(found.creation_time() <= first_access);
        assert!(store.find("unknown").is_none());
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::new();
        store.set_default_timeout(Some(Duration::from_millis(20)));
        let short = store.create();
        let forever = store.create();
        forever.set_max_inactive_interval(None);

        std::thread::sleep(Duration::from_millis(40));
        assert!(store.find(short.id()).is_none());
        assert!(store.find(forever.id()).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn purge_and_invalidate() {
        let store = SessionStore::new();
        let kept = store.create();
        let stale = store.create();
        stale.set_max_inactive_interval(Some(Duration::ZERO));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.purge_expired(), 1);
        assert!(store.invalidate(kept.id()));
        assert!(!store.invalidate(kept.id()));
        assert!(store.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let store = SessionStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().len(), 32);
    }
}
