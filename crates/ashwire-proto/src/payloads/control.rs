//! Kill-switch payload types.
//!
//! The kill switch is the operator-only panic endpoint. The attempt payload
//! carries the shared secret; the reply mirrors the accept / invalid-secret /
//! locked-out distinctions. Once the switch has fired there are no replies
//! at all - every frame receives a uniform not-found error.

use serde::{Deserialize, Serialize};

/// Kill-switch activation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchAttempt {
    /// Supplied shared secret. Compared in constant time, never logged.
    pub secret: String,
}

/// Outcome of a kill-switch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchReply {
    /// True if the secret matched and termination is scheduled.
    pub accepted: bool,

    /// Milliseconds until teardown begins. Present only when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Attempts remaining before lockout. Present on invalid secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,

    /// Milliseconds until this origin may try again. Present on lockout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl KillSwitchReply {
    /// Accepted reply with the activation delay.
    #[must_use]
    pub fn accepted(delay_ms: u64) -> Self {
        Self {
            accepted: true,
            delay_ms: Some(delay_ms),
            attempts_remaining: None,
            retry_after_ms: None,
        }
    }

    /// Rejected reply for a wrong secret.
    #[must_use]
    pub fn invalid_secret(attempts_remaining: u32) -> Self {
        Self {
            accepted: false,
            delay_ms: None,
            attempts_remaining: Some(attempts_remaining),
            retry_after_ms: None,
        }
    }

    /// Rejected reply for a locked-out origin.
    #[must_use]
    pub fn locked_out(retry_after_ms: u64) -> Self {
        Self {
            accepted: false,
            delay_ms: None,
            attempts_remaining: None,
            retry_after_ms: Some(retry_after_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_round_trip() {
        let original = KillSwitchAttempt { secret: "hunter2".to_string() };

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: KillSwitchAttempt = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn reply_constructors() {
        let accepted = KillSwitchReply::accepted(1_500);
        assert!(accepted.accepted);
        assert_eq!(accepted.delay_ms, Some(1_500));

        let invalid = KillSwitchReply::invalid_secret(2);
        assert!(!invalid.accepted);
        assert_eq!(invalid.attempts_remaining, Some(2));

        let locked = KillSwitchReply::locked_out(86_400_000);
        assert!(!locked.accepted);
        assert_eq!(locked.retry_after_ms, Some(86_400_000));
    }

    #[test]
    fn reply_round_trip() {
        let original = KillSwitchReply::locked_out(60_000);

        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&original, &mut encoded).unwrap();

        let decoded: KillSwitchReply = ciborium::de::from_reader(&encoded[..]).unwrap();
        assert_eq!(original, decoded);
    }
}
