//! Key-exchange payload types.
//!
//! Public keys are opaque byte strings end-to-end: the relay stores and
//! forwards them without parsing. Keys are exchanged eagerly (fan-out when a
//! session submits its key) and lazily (on-demand peer lookup) so clients
//! can join in any order without a rendezvous step.

use serde::{Deserialize, Serialize};

/// A session's own public key, submitted after connecting.
///
/// Submitting again overwrites the previous key (idempotent). The relay
/// fans the key out to every other connected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKey {
    /// Opaque public key material.
    pub key: Vec<u8>,
}

/// Request for a specific peer's public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerKeyRequest {
    /// Session whose key is wanted.
    pub session_id: u64,
}

/// A peer's public key, delivered on fan-out or on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerKey {
    /// Session the key belongs to.
    pub session_id: u64,
    /// Opaque public key material.
    pub key: Vec<u8>,
}

/// The relay's own public key.
///
/// Pushed once to every session on connect, and served on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayKey {
    /// Opaque public key material.
    pub key: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_key_round_trip() {
        let original = ClientKey { key: vec![0xAB; 32] };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: ClientKey = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn peer_key_round_trip() {
        let original = PeerKey { session_id: 42, key: vec![1, 2, 3] };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: PeerKey = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }
}
