//! Envelope payload types.
//!
//! An envelope is one opaque ciphertext message plus routing metadata. The
//! relay validates only that ciphertext is present; the bytes themselves are
//! never inspected, transformed, or decrypted on the relay side.

use serde::{Deserialize, Serialize};

/// Encrypted envelope submitted by a client for forwarding.
///
/// `recipient_id` of `None` means broadcast to every other session.
/// `display_name` is self-asserted and cosmetic only - it is never used for
/// authorization or routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSubmit {
    /// Opaque ciphertext. Must be non-empty.
    pub ciphertext: Vec<u8>,

    /// Target session. `None` broadcasts to all other sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<u64>,

    /// Self-asserted display name shown to recipients.
    pub display_name: String,
}

/// Encrypted envelope as forwarded to recipients.
///
/// The ciphertext is byte-identical to what the sender submitted. The relay
/// adds only the id, sender session, and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeDeliver {
    /// Relay-assigned envelope identifier.
    pub id: u64,

    /// Opaque ciphertext, forwarded unchanged.
    pub ciphertext: Vec<u8>,

    /// Originating session.
    pub sender_id: u64,

    /// Sender's self-asserted display name.
    pub display_name: String,

    /// Unix millisecond timestamp assigned at relay time.
    pub timestamp: u64,
}

/// One replayed history entry.
///
/// Same shape as [`EnvelopeDeliver`]; kept separate so history replay and
/// live delivery can evolve independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Relay-assigned envelope identifier.
    pub id: u64,
    /// Opaque ciphertext.
    pub ciphertext: Vec<u8>,
    /// Originating session.
    pub sender_id: u64,
    /// Sender's self-asserted display name.
    pub display_name: String,
    /// Unix millisecond timestamp assigned at relay time.
    pub timestamp: u64,
}

/// Recent-envelope replay pushed once to a newly joined session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Entries, most recent first.
    pub entries: Vec<HistoryEntry>,
}

/// Legacy unencrypted message.
///
/// Retained only so the opcode can be recognized and rejected. The relay
/// never accepts, stores, or forwards this payload; every `LegacyMessage`
/// frame is answered with a plaintext-rejected error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMessage {
    /// Uninspected message content. Discarded on rejection.
    pub content: String,
}
