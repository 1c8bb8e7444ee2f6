//! Session registry for connection and key tracking.
//!
//! The registry is the single owner of all live [`Session`] records. Other
//! components hold only session ids. Iteration follows insertion order so
//! tests observe deterministic results.
//!
//! `unregister` is idempotent: removing an absent session is not an error,
//! the desired side effect is already achieved.

use std::collections::HashMap;

/// Server-side identity of one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque public key material. Absent until the client submits one;
    /// resubmission overwrites.
    pub public_key: Option<Vec<u8>>,
    /// Unix millisecond timestamp of connection establishment.
    pub connected_at: u64,
    /// Client network origin, used only to rate-limit kill-switch attempts.
    pub origin: String,
}

impl Session {
    /// Create a session with no key yet.
    #[must_use]
    pub fn new(connected_at: u64, origin: impl Into<String>) -> Self {
        Self { public_key: None, connected_at, origin: origin.into() }
    }
}

/// Registry tracking active sessions and their declared public keys.
///
/// Insertion order is preserved via a side vector; `wipe()` clears both
/// structures atomically from the caller's perspective (single `&mut`
/// critical section).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Session id → session record
    sessions: HashMap<u64, Session>,
    /// Ids in insertion order (for deterministic iteration)
    order: Vec<u64>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    ///
    /// Returns `false` if the id is already registered.
    pub fn register(&mut self, session_id: u64, session: Session) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, session);
        self.order.push(session_id);
        true
    }

    /// Attach or overwrite key material for an existing session.
    ///
    /// Overwriting is idempotent by design. Returns `false` if the session
    /// is not registered.
    pub fn set_public_key(&mut self, session_id: u64, key: Vec<u8>) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(session) => {
                session.public_key = Some(key);
                true
            },
            None => false,
        }
    }

    /// Remove a session. Idempotent: unknown ids return `None` without
    /// error.
    pub fn unregister(&mut self, session_id: u64) -> Option<Session> {
        let session = self.sessions.remove(&session_id)?;
        self.order.retain(|id| *id != session_id);
        Some(session)
    }

    /// Session record. `None` if not registered.
    #[must_use]
    pub fn get(&self, session_id: u64) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn contains(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// All sessions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Session)> + '_ {
        self.order.iter().filter_map(|id| self.sessions.get(id).map(|s| (*id, s)))
    }

    /// All session ids in insertion order.
    pub fn session_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.order.iter().copied()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Atomically clear all sessions.
    ///
    /// Called only by the kill-switch teardown path.
    pub fn wipe(&mut self) {
        self.sessions.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_session() {
        let mut registry = SessionRegistry::new();

        assert!(registry.register(1, Session::new(0, "10.0.0.1")));
        assert!(registry.contains(1));
        assert!(!registry.contains(2));

        let session = registry.get(1).unwrap();
        assert!(session.public_key.is_none());
        assert_eq!(session.origin, "10.0.0.1");
    }

    #[test]
    fn register_duplicate_session_fails() {
        let mut registry = SessionRegistry::new();

        assert!(registry.register(1, Session::new(0, "a")));
        assert!(!registry.register(1, Session::new(0, "b")));

        // Original record untouched
        assert_eq!(registry.get(1).unwrap().origin, "a");
    }

    #[test]
    fn set_public_key_overwrites() {
        let mut registry = SessionRegistry::new();

        registry.register(1, Session::new(0, "a"));

        assert!(registry.set_public_key(1, vec![1, 2, 3]));
        assert_eq!(registry.get(1).unwrap().public_key.as_deref(), Some(&[1u8, 2, 3][..]));

        // Idempotent overwrite
        assert!(registry.set_public_key(1, vec![4, 5]));
        assert_eq!(registry.get(1).unwrap().public_key.as_deref(), Some(&[4u8, 5][..]));
    }

    #[test]
    fn set_public_key_unknown_session_fails() {
        let mut registry = SessionRegistry::new();

        assert!(!registry.set_public_key(999, vec![1]));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = SessionRegistry::new();

        registry.register(1, Session::new(0, "a"));

        assert!(registry.unregister(1).is_some());
        assert!(registry.unregister(1).is_none());
        assert!(registry.unregister(999).is_none());
        assert!(!registry.contains(1));
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut registry = SessionRegistry::new();

        registry.register(30, Session::new(0, "a"));
        registry.register(10, Session::new(0, "b"));
        registry.register(20, Session::new(0, "c"));

        let ids: Vec<u64> = registry.session_ids().collect();
        assert_eq!(ids, vec![30, 10, 20]);

        registry.unregister(10);
        let ids: Vec<u64> = registry.session_ids().collect();
        assert_eq!(ids, vec![30, 20]);
    }

    #[test]
    fn len_tracks_net_registrations() {
        let mut registry = SessionRegistry::new();

        assert_eq!(registry.len(), 0);

        registry.register(1, Session::new(0, "a"));
        registry.register(2, Session::new(0, "b"));
        assert_eq!(registry.len(), 2);

        registry.unregister(1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn wipe_clears_everything() {
        let mut registry = SessionRegistry::new();

        registry.register(1, Session::new(0, "a"));
        registry.register(2, Session::new(0, "b"));

        registry.wipe();

        assert!(registry.is_empty());
        assert_eq!(registry.session_ids().count(), 0);
        assert!(!registry.contains(1));
    }
}
