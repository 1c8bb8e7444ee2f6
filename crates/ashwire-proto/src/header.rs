//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 64-byte structure serialized as raw binary
//! (Big Endian). The relay routes frames by reading only this header, never
//! the payload bytes.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 64-byte frame header (Big Endian network byte order)
///
/// All multi-byte integers are stored in Big Endian format to match network
/// byte order. Fields are stored as raw byte arrays to avoid alignment
/// issues. The header fits a single 64-byte CPU cache line, so routing a
/// frame touches exactly one line.
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes - all 64-byte patterns
/// are valid, preventing undefined behavior. The header carries routing
/// metadata only; payload content is opaque ciphertext the relay never
/// interprets.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],             // 0x41534857 ("ASHW" in ASCII)
    version: u8,                // 0x01
    flags: u8,                  // reserved, must be zero
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Request/payload metadata (8 bytes: 8-15)
    request_id: [u8; 4], // u32 client nonce for response correlation
    pub(crate) payload_size: [u8; 4], // u32 payload length

    // Routing context (24 bytes: 16-39)
    sender_id: [u8; 8],    // u64 originating session
    recipient_id: [u8; 8], // u64 target session (0 = broadcast/unset)
    envelope_id: [u8; 8],  // u64 envelope identifier (relay-assigned)

    // Bookkeeping (8 bytes: 40-47)
    timestamp_ms: [u8; 8], // u64 Unix milliseconds (relay-assigned)

    // Reserved (16 bytes: 48-63)
    reserved: [u8; 16],
}

impl FrameHeader {
    /// Size of the serialized header (64 bytes)
    /// Fits exactly one 64-byte CPU cache line
    pub const SIZE: usize = 64;

    /// Magic number: "ASHW" in ASCII (0x41534857)
    pub const MAGIC: u32 = 0x4153_4857;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MB)
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a new header with the specified opcode.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&Self::MAGIC.to_be_bytes());
        bytes[4] = Self::VERSION;
        bytes[6..8].copy_from_slice(&opcode.to_u16().to_be_bytes());

        // SAFETY: We just constructed valid bytes with correct magic and version.
        // from_bytes will validate these and return a valid header.
        Self::from_bytes(&bytes)
            .ok()
            .unwrap_or_else(|| unreachable!("constructed valid header with correct magic/version"))
            .to_owned()
    }

    /// Parse header from network bytes (zero-copy, safe)
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if buffer is too short (< 64 bytes)
    /// - `ProtocolError::InvalidMagic` if magic number is invalid
    /// - `ProtocolError::UnsupportedVersion` if protocol version is unsupported
    /// - `ProtocolError::PayloadTooLarge` if payload size exceeds maximum
    ///
    /// # Security
    ///
    /// - Zero-Copy Safety: The `zerocopy` crate verifies at compile-time that
    ///   `FrameHeader` has a stable memory layout. All bit patterns are valid
    ///   (no invalid representations), so casting arbitrary bytes cannot cause
    ///   undefined behavior.
    ///
    /// - Validation Order: We validate cheapest-to-check properties first
    ///   (size, magic) before more expensive ones (version, payload size).
    ///   This fails fast on garbage data.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes (zero-copy)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number (0x41534857 = "ASHW").
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte (currently 0x01).
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-assigned nonce for request/response correlation.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// Originating session identifier (relay-assigned).
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Target session identifier. Zero means broadcast/unset.
    #[must_use]
    pub fn recipient_id(&self) -> u64 {
        u64::from_be_bytes(self.recipient_id)
    }

    /// Envelope identifier (relay-assigned at forward time).
    #[must_use]
    pub fn envelope_id(&self) -> u64 {
        u64::from_be_bytes(self.envelope_id)
    }

    /// Unix millisecond timestamp (relay-assigned at forward time).
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        u64::from_be_bytes(self.timestamp_ms)
    }

    /// Payload size in bytes (max 1 MB).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Set client request nonce for response correlation.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Update sender session identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Update target session identifier. Zero means broadcast/unset.
    pub fn set_recipient_id(&mut self, recipient_id: u64) {
        self.recipient_id = recipient_id.to_be_bytes();
    }

    /// Update envelope identifier.
    pub fn set_envelope_id(&mut self, envelope_id: u64) {
        self.envelope_id = envelope_id.to_be_bytes();
    }

    /// Update Unix millisecond timestamp.
    pub fn set_timestamp_ms(&mut self, timestamp_ms: u64) {
        self.timestamp_ms = timestamp_ms.to_be_bytes();
    }

    /// Set payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format_args!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("opcode", &format_args!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .field("sender_id", &self.sender_id())
            .field("recipient_id", &self.recipient_id())
            .field("envelope_id", &self.envelope_id())
            .field("timestamp_ms", &self.timestamp_ms())
            .finish()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
