//! Driver error types.
//!
//! Provides strongly-typed errors for relay operations:
//! - Lifecycle gating (terminated service)
//! - Routing lookups (session, key availability)
//! - Structural payload rejection (plaintext, malformed frames)
//!
//! Component-local errors are recovered at the driver boundary and turned
//! into error frames for the originating session; they never crash the
//! relay process. Termination is the one deliberate exception: it is not an
//! error to recover from but a terminal state, surfaced uniformly as "not
//! found" so post-termination traffic learns nothing.

use std::fmt;

/// Errors that can occur during relay driver operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The kill switch has fired.
    ///
    /// Every operation after activation fails with this. At the wire
    /// boundary it is always rendered as a bare "not found", never as a
    /// distinct terminated signal.
    ServiceTerminated,

    /// Session not found in registry.
    ///
    /// Occurs when a routing lookup names a session that doesn't exist.
    /// May be transient if the session just disconnected - the peer simply
    /// gets an error frame.
    UnknownSession(u64),

    /// Target session exists but has not submitted a public key yet.
    ///
    /// Recoverable: the requester can retry after the peer's key fan-out
    /// arrives.
    KeyNotAvailable(u64),

    /// Payload was not acceptable ciphertext.
    ///
    /// Structural rejection of plaintext or empty submissions. Fatal to
    /// that single request, not to the connection.
    PlaintextRejected,

    /// Frame encoding/decoding error.
    ///
    /// Invalid frame format received from a client or failure to encode a
    /// response. Fatal for that frame - indicates a protocol violation or
    /// bug.
    Protocol(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceTerminated => write!(f, "service terminated"),
            Self::UnknownSession(id) => write!(f, "unknown session: {id}"),
            Self::KeyNotAvailable(id) => write!(f, "no key available for session {id}"),
            Self::PlaintextRejected => write!(f, "plaintext not permitted"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ashwire_proto::ProtocolError> for RelayError {
    fn from(err: ashwire_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_display() {
        let err = RelayError::UnknownSession(42);
        assert_eq!(err.to_string(), "unknown session: 42");

        let err = RelayError::KeyNotAvailable(7);
        assert_eq!(err.to_string(), "no key available for session 7");

        let err = RelayError::ServiceTerminated;
        assert_eq!(err.to_string(), "service terminated");

        let err = RelayError::PlaintextRejected;
        assert_eq!(err.to_string(), "plaintext not permitted");
    }

    #[test]
    fn protocol_error_converts() {
        let proto_err = ashwire_proto::ProtocolError::InvalidMagic;
        let err: RelayError = proto_err.into();

        assert!(matches!(err, RelayError::Protocol(_)));
    }
}
