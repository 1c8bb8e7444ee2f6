//! Ashwire wire protocol.
//!
//! Defines the transport-layer framing for the Ashwire relay: a fixed
//! 64-byte binary header (Big Endian) for O(1) routing decisions, plus
//! CBOR-encoded payloads for everything the relay itself never needs to
//! inspect.
//!
//! # Design
//!
//! The relay is a blind router: it reads only the header to decide where a
//! frame goes. Payload bytes are opaque to it. Clients deserialize payloads
//! with [`Payload::from_frame`]; the relay constructs outbound frames with
//! [`Payload::into_frame`].
//!
//! # Layers
//!
//! - [`FrameHeader`]: fixed 64-byte routing header, zero-copy parsed
//! - [`Frame`]: header + raw payload bytes (wire unit)
//! - [`Payload`]: typed CBOR payload, keyed by [`Opcode`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::ProtocolError;
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier for QUIC transport negotiation.
pub const ALPN_PROTOCOL: &[u8] = b"ashwire";

/// Frame operation codes.
///
/// Each opcode identifies exactly one payload type. The header carries the
/// opcode so the relay can route without touching payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client submits its own public key.
    ClientKey = 0x0001,
    /// Client requests a peer's public key by session id.
    PeerKeyRequest = 0x0002,
    /// Relay delivers a peer's public key.
    PeerKey = 0x0003,
    /// Client requests the relay's own public key.
    RelayKeyRequest = 0x0004,
    /// Relay delivers its own public key (pushed once on connect).
    RelayKey = 0x0005,

    /// Client submits an encrypted envelope for forwarding.
    EnvelopeSubmit = 0x0010,
    /// Relay forwards an encrypted envelope to a recipient.
    EnvelopeDeliver = 0x0011,
    /// Relay replays recent envelopes to a newly joined session.
    History = 0x0012,
    /// Legacy unencrypted message. Always rejected.
    LegacyMessage = 0x0013,

    /// Kill-switch activation attempt.
    KillSwitch = 0x0020,
    /// Kill-switch attempt outcome.
    KillSwitchReply = 0x0021,

    /// Error response.
    Error = 0x00FF,
}

impl Opcode {
    /// Numeric wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse an opcode from its wire value. `None` for unknown codes.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::ClientKey),
            0x0002 => Some(Self::PeerKeyRequest),
            0x0003 => Some(Self::PeerKey),
            0x0004 => Some(Self::RelayKeyRequest),
            0x0005 => Some(Self::RelayKey),
            0x0010 => Some(Self::EnvelopeSubmit),
            0x0011 => Some(Self::EnvelopeDeliver),
            0x0012 => Some(Self::History),
            0x0013 => Some(Self::LegacyMessage),
            0x0020 => Some(Self::KillSwitch),
            0x0021 => Some(Self::KillSwitchReply),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trip() {
        let opcodes = [
            Opcode::ClientKey,
            Opcode::PeerKeyRequest,
            Opcode::PeerKey,
            Opcode::RelayKeyRequest,
            Opcode::RelayKey,
            Opcode::EnvelopeSubmit,
            Opcode::EnvelopeDeliver,
            Opcode::History,
            Opcode::LegacyMessage,
            Opcode::KillSwitch,
            Opcode::KillSwitchReply,
            Opcode::Error,
        ];

        for opcode in opcodes {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(Opcode::from_u16(0x7777), None);
        assert_eq!(Opcode::from_u16(0x0000), None);
    }
}
