//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for performance, but payloads use CBOR for
//! type safety and forward compatibility. The `Payload` enum covers all
//! message types: key exchange, envelope forwarding, history replay, and the
//! kill switch.
//!
//! We chose CBOR over alternatives because it's self-describing (field names
//! embedded), compact, and doesn't need code generation. The relay never
//! deserializes envelope ciphertext - only clients do.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

pub mod control;
pub mod envelope;
pub mod keys;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads
///
/// The payload type is determined by the `Opcode` in the frame header,
/// so we serialize only the inner struct content (no variant tag in CBOR).
///
/// # Invariants
///
/// - Opcode Uniqueness: Each payload variant corresponds to exactly one
///   `Opcode`. The `opcode()` method returns a unique opcode for each
///   variant.
///
/// - Serialization Consistency: Encoding a `Payload` and then decoding it
///   with the same opcode MUST produce an equivalent value. This is verified
///   by round-trip tests.
///
/// # Security
///
/// - No Variant Tag: Unlike typical Rust enum serialization, we do NOT
///   serialize the variant discriminator. The frame header's `opcode` field
///   already identifies the payload type. This prevents mismatched
///   opcode/payload pairs.
///
/// - Exhaustive Matching: All methods use exhaustive `match` statements.
///   Adding a new variant will cause compile errors in `encode()`,
///   `decode()`, and `opcode()`, ensuring no variant is accidentally left
///   unhandled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Key exchange
    /// Client submits its own public key
    ClientKey(keys::ClientKey),
    /// Request for a peer's public key
    PeerKeyRequest(keys::PeerKeyRequest),
    /// A peer's public key
    PeerKey(keys::PeerKey),
    /// Request for the relay's own public key
    RelayKeyRequest,
    /// The relay's own public key
    RelayKey(keys::RelayKey),

    // Envelope forwarding
    /// Encrypted envelope submission
    EnvelopeSubmit(envelope::EnvelopeSubmit),
    /// Encrypted envelope delivery
    EnvelopeDeliver(envelope::EnvelopeDeliver),
    /// Recent-envelope replay for a newly joined session
    History(envelope::History),
    /// Legacy unencrypted message (always rejected)
    LegacyMessage(envelope::LegacyMessage),

    // Kill switch
    /// Kill-switch activation attempt
    KillSwitch(control::KillSwitchAttempt),
    /// Kill-switch attempt outcome
    KillSwitchReply(control::KillSwitchReply),

    // Error frame
    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
    /// Optional retry-after duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorPayload {
    /// Resource not found. The uniform post-termination answer.
    pub const NOT_FOUND: u16 = 0x0001;
    /// Session id does not resolve to a live session.
    pub const UNKNOWN_SESSION: u16 = 0x0002;
    /// Target session exists but has not submitted a key.
    pub const KEY_NOT_AVAILABLE: u16 = 0x0003;
    /// Payload was not acceptable ciphertext.
    pub const PLAINTEXT_REJECTED: u16 = 0x0004;
    /// Kill-switch secret did not match.
    pub const INVALID_SECRET: u16 = 0x0005;
    /// Kill-switch attempts exhausted for this origin.
    pub const LOCKED_OUT: u16 = 0x0006;
    /// Payload failed structural decoding.
    pub const INVALID_PAYLOAD: u16 = 0x0007;
    /// The relay's own key material is unavailable.
    pub const RELAY_KEY_UNAVAILABLE: u16 = 0x0008;

    /// Create a bare not-found error.
    ///
    /// Deliberately carries no detail: post-termination, every request of
    /// any kind receives exactly this payload.
    #[must_use]
    pub fn not_found() -> Self {
        Self { code: Self::NOT_FOUND, message: "not found".to_string(), retry_after_ms: None }
    }

    /// Create an unknown-session error.
    #[must_use]
    pub fn unknown_session(session_id: u64) -> Self {
        Self {
            code: Self::UNKNOWN_SESSION,
            message: format!("unknown session: {session_id}"),
            retry_after_ms: None,
        }
    }

    /// Create a key-not-available error.
    #[must_use]
    pub fn key_not_available(session_id: u64) -> Self {
        Self {
            code: Self::KEY_NOT_AVAILABLE,
            message: format!("no key available for session {session_id}"),
            retry_after_ms: None,
        }
    }

    /// Create a plaintext-rejected error.
    #[must_use]
    pub fn plaintext_rejected() -> Self {
        Self {
            code: Self::PLAINTEXT_REJECTED,
            message: "plaintext not permitted".to_string(),
            retry_after_ms: None,
        }
    }

    /// Create an invalid-payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into(), retry_after_ms: None }
    }

    /// Create a relay-key-unavailable error.
    #[must_use]
    pub fn relay_key_unavailable() -> Self {
        Self {
            code: Self::RELAY_KEY_UNAVAILABLE,
            message: "relay key not available".to_string(),
            retry_after_ms: None,
        }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::ClientKey(_) => Opcode::ClientKey,
            Self::PeerKeyRequest(_) => Opcode::PeerKeyRequest,
            Self::PeerKey(_) => Opcode::PeerKey,
            Self::RelayKeyRequest => Opcode::RelayKeyRequest,
            Self::RelayKey(_) => Opcode::RelayKey,
            Self::EnvelopeSubmit(_) => Opcode::EnvelopeSubmit,
            Self::EnvelopeDeliver(_) => Opcode::EnvelopeDeliver,
            Self::History(_) => Opcode::History,
            Self::LegacyMessage(_) => Opcode::LegacyMessage,
            Self::KillSwitch(_) => Opcode::KillSwitch,
            Self::KillSwitchReply(_) => Opcode::KillSwitchReply,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, NOT the variant tag.
    /// The frame header's opcode already identifies the payload type.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::ClientKey(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::PeerKeyRequest(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::PeerKey(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RelayKeyRequest => Ok(()), // Zero-byte payload
            Self::RelayKey(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::EnvelopeSubmit(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::EnvelopeDeliver(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::History(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LegacyMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::KillSwitch(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::KillSwitchReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode
    ///
    /// # Security
    ///
    /// - Size Validation First: The size check happens BEFORE CBOR parsing
    ///   begins. This prevents the CBOR parser from processing maliciously
    ///   large inputs that could exhaust memory or CPU.
    ///
    /// - Fail on Unknown Opcodes: Unknown opcodes are rejected with an error
    ///   rather than being silently ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    ///   (1 MB)
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
        }

        let payload = match opcode {
            Opcode::ClientKey => Self::ClientKey(de(bytes)?),
            Opcode::PeerKeyRequest => Self::PeerKeyRequest(de(bytes)?),
            Opcode::PeerKey => Self::PeerKey(de(bytes)?),
            Opcode::RelayKeyRequest => Self::RelayKeyRequest,
            Opcode::RelayKey => Self::RelayKey(de(bytes)?),
            Opcode::EnvelopeSubmit => Self::EnvelopeSubmit(de(bytes)?),
            Opcode::EnvelopeDeliver => Self::EnvelopeDeliver(de(bytes)?),
            Opcode::History => Self::History(de(bytes)?),
            Opcode::LegacyMessage => Self::LegacyMessage(de(bytes)?),
            Opcode::KillSwitch => Self::KillSwitch(de(bytes)?),
            Opcode::KillSwitchReply => Self::KillSwitchReply(de(bytes)?),
            Opcode::Error => Self::Error(de(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame
    ///
    /// This method handles the logic-to-transport conversion:
    /// - Encodes the payload to CBOR bytes
    /// - Sets the correct opcode in the header
    /// - Creates a Frame with automatic `payload_size` calculation
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// This method handles the transport-to-logic conversion:
    /// - Extracts the opcode from the frame header
    /// - Decodes the payload bytes based on the opcode
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header's opcode is unknown
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    /// - `ProtocolError::PayloadTooLarge` if payload exceeds maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
