//! Envelope records and the bounded history buffer.
//!
//! The store is the single owner of all [`Envelope`] records. Ciphertext is
//! an uninterpreted blob end-to-end: nothing in this module reads, parses,
//! or transforms it. History is a catch-up convenience only - delivery is
//! fire-and-forget and nothing here constitutes a durable queue.

use std::collections::VecDeque;

use bytes::Bytes;

/// One relayed message: opaque ciphertext plus routing metadata.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Relay-assigned unique identifier.
    pub id: u64,
    /// Opaque ciphertext. Never inspected or transformed.
    pub ciphertext: Bytes,
    /// Originating session.
    pub sender_id: u64,
    /// Target session. `None` means broadcast.
    pub recipient_id: Option<u64>,
    /// Sender's self-asserted display name. Cosmetic only, never used for
    /// authorization.
    pub display_name: String,
    /// Unix millisecond timestamp assigned at relay time.
    pub timestamp: u64,
    /// True if handed to a resolved directed recipient.
    pub delivered: bool,
}

/// Bounded most-recent-first history of relayed envelopes.
///
/// Used to replay recent traffic to a newly joined session. Oldest entries
/// are evicted first once capacity is reached. Only real client envelopes
/// are recorded, so the history can never contain plaintext or
/// system-generated content.
#[derive(Debug)]
pub struct EnvelopeStore {
    /// Envelopes, newest at the front.
    history: VecDeque<Envelope>,
    /// Maximum retained entries. Zero disables history entirely.
    capacity: usize,
}

impl EnvelopeStore {
    /// Create a store retaining at most `capacity` envelopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { history: VecDeque::with_capacity(capacity.min(1024)), capacity }
    }

    /// Record an envelope, evicting the oldest entry if at capacity.
    pub fn record(&mut self, envelope: Envelope) {
        if self.capacity == 0 {
            return;
        }

        self.history.push_front(envelope);
        while self.history.len() > self.capacity {
            self.history.pop_back();
        }
    }

    /// The most recent `limit` envelopes, newest first, excluding those sent
    /// by `exclude_sender`.
    pub fn recent(&self, limit: usize, exclude_sender: u64) -> impl Iterator<Item = &Envelope> {
        self.history.iter().filter(move |e| e.sender_id != exclude_sender).take(limit)
    }

    /// Number of retained envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// True if no envelopes are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Atomically clear all retained envelopes.
    ///
    /// Called only by the kill-switch teardown path.
    pub fn wipe(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: u64, sender_id: u64) -> Envelope {
        Envelope {
            id,
            ciphertext: Bytes::from_static(&[0xAA; 8]),
            sender_id,
            recipient_id: None,
            display_name: "anon".to_string(),
            timestamp: id * 1000,
            delivered: false,
        }
    }

    #[test]
    fn record_and_recent_newest_first() {
        let mut store = EnvelopeStore::new(10);

        store.record(envelope(1, 100));
        store.record(envelope(2, 100));
        store.record(envelope(3, 200));

        let ids: Vec<u64> = store.recent(10, 0).map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut store = EnvelopeStore::new(2);

        store.record(envelope(1, 100));
        store.record(envelope(2, 100));
        store.record(envelope(3, 100));

        assert_eq!(store.len(), 2);
        let ids: Vec<u64> = store.recent(10, 0).map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn recent_excludes_requester_own_messages() {
        let mut store = EnvelopeStore::new(10);

        store.record(envelope(1, 100));
        store.record(envelope(2, 200));
        store.record(envelope(3, 100));

        let ids: Vec<u64> = store.recent(10, 100).map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn recent_respects_limit_after_exclusion() {
        let mut store = EnvelopeStore::new(10);

        for id in 1..=6 {
            store.record(envelope(id, if id % 2 == 0 { 200 } else { 100 }));
        }

        // Excluding sender 100 leaves ids 6, 4, 2; limit trims to two
        let ids: Vec<u64> = store.recent(2, 100).map(|e| e.id).collect();
        assert_eq!(ids, vec![6, 4]);
    }

    #[test]
    fn zero_capacity_disables_history() {
        let mut store = EnvelopeStore::new(0);

        store.record(envelope(1, 100));

        assert!(store.is_empty());
    }

    #[test]
    fn wipe_clears_everything() {
        let mut store = EnvelopeStore::new(10);

        store.record(envelope(1, 100));
        store.record(envelope(2, 200));

        store.wipe();

        assert!(store.is_empty());
        assert_eq!(store.recent(10, 0).count(), 0);
    }
}
