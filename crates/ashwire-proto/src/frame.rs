//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet consisting of:
//! - 64-byte raw binary header (Big Endian) for O(1) routing
//! - Variable-length raw bytes (already encoded)
//!
//! This is a pure data holder (header + bytes). For high-level logic,
//! see `Payload::into_frame()` and `Payload::from_frame()`.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame (transport layer)
///
/// Layout on the wire:
/// `[FrameHeader: 64 bytes, raw binary] + [payload: variable bytes]`
///
/// Holds raw bytes, NOT the Payload enum. The relay routes frames without
/// deserializing the payload.
///
/// # Invariants
///
/// - Size Consistency: `payload.len()` MUST match `header.payload_size()`.
///   This invariant is enforced by [`Frame::new`] and verified by
///   [`Frame::decode`].
///
/// - Size Limit: `payload.len()` MUST NOT exceed
///   [`FrameHeader::MAX_PAYLOAD_SIZE`] (1 MB). Violations are rejected during
///   construction and encoding.
///
/// # Security
///
/// Provides structural validity only. Guarantees valid header format (magic
/// number, version, size limits) and that payload size matches header claim.
/// Payload bytes may be ciphertext; the relay never decrypts or inspects
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (64 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic payload_size calculation
    ///
    /// The header's `payload_size` field is automatically set to match
    /// the actual payload length, ensuring consistency.
    ///
    /// # Panics
    ///
    /// Panics if `payload.len() > u32::MAX`. In practice, this cannot happen
    /// because `Bytes` is bounded by `isize::MAX` and the protocol limit is
    /// 1 MB.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: Payload length always fits in u32 because:
        // 1. Bytes is bounded by isize::MAX (Rust allocation limit)
        // 2. MAX_PAYLOAD_SIZE (1MB) << u32::MAX (4GB)
        #[allow(clippy::expect_used)]
        let payload_len = u32::try_from(payload.len())
            .expect("invariant: payload length fits in u32 (bounded by protocol limit)");

        header.set_payload_size(payload_len);

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode frame into buffer (simple copy, no magic)
    ///
    /// Writes: `[header (64 bytes)] + [payload (variable)]`
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if payload exceeds MAX_PAYLOAD_SIZE
    ///   (1 MB)
    ///
    /// # Security
    ///
    /// - Size Limit Enforcement: This is the enforcement point for the 1 MB
    ///   payload limit. Frames exceeding this size are rejected to prevent
    ///   memory exhaustion.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode frame from wire format
    ///
    /// Returns a Frame with raw bytes (does NOT deserialize payload).
    /// Use `Payload::from_frame()` if you need the high-level enum.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if header parsing fails (invalid magic, version, or
    ///   size limits)
    /// - `ProtocolError::FrameTruncated` if payload is truncated (fewer bytes
    ///   than header claims)
    ///
    /// # Security
    ///
    /// - Fail Fast: All validation happens before allocating memory for the
    ///   payload. Malformed headers are rejected without copying data.
    ///
    /// - Exact Size: We only read exactly `payload_size` bytes from the
    ///   buffer. Trailing data is ignored, preventing buffer over-read.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE.checked_add(payload_size).ok_or({
            ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            }
        })?;

        debug_assert!(total_size >= FrameHeader::SIZE);

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        // INVARIANT: We've validated bytes.len() >= total_size in the truncation
        // check above. This slice operation cannot panic because:
        // - total_size = FrameHeader::SIZE + payload_size (checked arithmetic)
        // - We verified bytes.len() >= total_size in the preceding check
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(FrameHeader::SIZE..total_size).expect("invariant: bounds checked above"),
        );

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    #[test]
    fn frame_with_payload() {
        let header = FrameHeader::new(Opcode::EnvelopeSubmit);

        let payload_bytes = vec![1, 2, 3, 4];
        let frame = Frame::new(header, payload_bytes.clone());

        let expected_size = payload_bytes.len() as u32;
        assert_eq!(frame.header.payload_size(), expected_size);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(frame.payload, parsed.payload);
        assert_eq!(frame.header, parsed.header);
    }

    #[test]
    fn empty_payload_round_trip() {
        let frame = Frame::new(FrameHeader::new(Opcode::RelayKeyRequest), Vec::new());

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        assert_eq!(wire.len(), FrameHeader::SIZE);

        let parsed = Frame::decode(&wire).expect("should decode");
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn reject_truncated_frame() {
        // Create header claiming 100 bytes of payload
        let mut header = FrameHeader::new(Opcode::EnvelopeSubmit);
        header.set_payload_size(100);

        let header_bytes = header.to_bytes();

        // Only provide header, no payload
        let result = Frame::decode(&header_bytes);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::ClientKey), vec![9, 9]);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        wire.extend_from_slice(&[0xAA; 8]);

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(parsed.payload.as_ref(), &[9, 9]);
    }
}
