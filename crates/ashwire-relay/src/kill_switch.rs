//! Kill-switch state machine with brute-force lockout.
//!
//! The switch gates every other component: once it has fired, the relay
//! answers every request with a bare "not found" and holds no state worth
//! finding. Activation is a one-way latch - there is no disarm path, by
//! design.
//!
//! Attempts are rate-limited per origin with a sliding cooldown window. The
//! window is evaluated lazily on each attempt, never by a background timer,
//! so an idle process keeps no clock machinery alive for it.
//!
//! # Security
//!
//! - The configured secret is hashed at construction; the raw secret is not
//!   retained in relay memory.
//! - Supplied secrets are compared digest-to-digest in constant time
//!   (`subtle`), so timing reveals nothing about prefix matches.
//! - Neither supplied nor configured secrets are ever logged.

use std::{collections::HashMap, time::Duration};

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Kill-switch configuration.
///
/// Defaults (attempt limit, cooldown, delay) are fixed at well-tested
/// values; only the secret must be supplied.
#[derive(Debug, Clone)]
pub struct KillSwitchConfig {
    /// Shared activation secret.
    pub secret: String,
    /// Failed attempts allowed per origin before lockout.
    pub max_attempts: u32,
    /// Sliding window after which an origin's attempt count resets.
    pub cooldown: Duration,
    /// Delay between acceptance and teardown, so the caller can receive
    /// acknowledgment before the connection dies.
    pub activation_delay: Duration,
}

impl KillSwitchConfig {
    /// Create a configuration with the given secret and default limits:
    /// 3 attempts per origin, 24 hour cooldown, 1.5 second activation delay.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_attempts: 3,
            cooldown: Duration::from_secs(24 * 60 * 60),
            activation_delay: Duration::from_millis(1500),
        }
    }
}

/// Service lifecycle latch.
///
/// `Terminated` is absorbing: no code path constructs `Armed` from an
/// existing switch, so the flag cannot be accidentally reset the way a
/// mutable boolean could.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Normal operation; attempts are validated.
    Armed,
    /// The switch has fired. All state is gone and stays gone.
    Terminated,
}

/// Outcome of one activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Secret matched; teardown begins after `delay`.
    Accepted {
        /// Delay before teardown, for acknowledgment round-trip.
        delay: Duration,
    },

    /// Secret did not match.
    InvalidSecret {
        /// Attempts left before this origin is locked out.
        attempts_remaining: u32,
    },

    /// Origin has exhausted its attempts within the cooldown window.
    LockedOut {
        /// Time until the window expires for this origin.
        retry_after: Duration,
    },

    /// The switch already fired. Idempotent no-op.
    AlreadyTerminated,
}

/// Per-origin attempt bookkeeping.
#[derive(Debug, Clone, Copy)]
struct AttemptRecord<I> {
    count: u32,
    last_attempt: I,
}

/// Kill-switch controller.
///
/// Generic over the instant type so tests can drive a virtual clock.
#[derive(Debug)]
pub struct KillSwitch<I> {
    lifecycle: Lifecycle,
    /// SHA-256 of the configured secret. The raw secret is not kept.
    secret_digest: [u8; 32],
    max_attempts: u32,
    cooldown: Duration,
    activation_delay: Duration,
    /// Origin → attempt record. Dropped entirely on termination.
    attempts: HashMap<String, AttemptRecord<I>>,
}

impl<I> KillSwitch<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an armed kill switch.
    #[must_use]
    pub fn new(config: &KillSwitchConfig) -> Self {
        Self {
            lifecycle: Lifecycle::Armed,
            secret_digest: Sha256::digest(config.secret.as_bytes()).into(),
            max_attempts: config.max_attempts,
            cooldown: config.cooldown,
            activation_delay: config.activation_delay,
            attempts: HashMap::new(),
        }
    }

    /// Validate an activation attempt from `origin`.
    ///
    /// Protocol, in order:
    /// 1. Already terminated → `AlreadyTerminated`.
    /// 2. Attempt count resets if the origin's cooldown window has elapsed.
    /// 3. Locked-out origins get `LockedOut` without a secret comparison;
    ///    the attempt time is still recorded so the lockout window slides.
    /// 4. The attempt is counted.
    /// 5. Constant-time comparison; mismatch → `InvalidSecret`.
    /// 6. Match → `Accepted`; the caller schedules [`Self::activate`] after
    ///    the returned delay. Scheduling is not cancellable.
    pub fn attempt(&mut self, origin: &str, supplied_secret: &str, now: I) -> AttemptOutcome {
        if self.lifecycle == Lifecycle::Terminated {
            return AttemptOutcome::AlreadyTerminated;
        }

        let mut record = self
            .attempts
            .get(origin)
            .copied()
            .unwrap_or(AttemptRecord { count: 0, last_attempt: now });

        let elapsed = now - record.last_attempt;
        if elapsed > self.cooldown {
            record.count = 0;
        }

        if record.count >= self.max_attempts {
            let retry_after = self.cooldown.saturating_sub(elapsed);
            record.last_attempt = now;
            self.attempts.insert(origin.to_string(), record);
            return AttemptOutcome::LockedOut { retry_after };
        }

        record.count += 1;
        record.last_attempt = now;
        self.attempts.insert(origin.to_string(), record);

        let supplied_digest: [u8; 32] = Sha256::digest(supplied_secret.as_bytes()).into();
        if supplied_digest.ct_eq(&self.secret_digest).into() {
            AttemptOutcome::Accepted { delay: self.activation_delay }
        } else {
            AttemptOutcome::InvalidSecret {
                attempts_remaining: self.max_attempts.saturating_sub(record.count),
            }
        }
    }

    /// Fire the switch. Idempotent.
    ///
    /// Returns `true` only on the transition from armed to terminated, so
    /// the caller runs teardown exactly once. The attempt table is dropped:
    /// post-termination state holds nothing about who tried.
    pub fn activate(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Terminated {
            return false;
        }

        self.lifecycle = Lifecycle::Terminated;
        self.attempts.clear();
        true
    }

    /// True once the switch has fired.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle == Lifecycle::Terminated
    }

    /// Delay between acceptance and teardown.
    #[must_use]
    pub fn activation_delay(&self) -> Duration {
        self.activation_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Virtual instant for deterministic clock control.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct TestInstant(Duration);

    impl std::ops::Sub for TestInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            self.0 - rhs.0
        }
    }

    fn at_secs(secs: u64) -> TestInstant {
        TestInstant(Duration::from_secs(secs))
    }

    fn switch() -> KillSwitch<TestInstant> {
        KillSwitch::new(&KillSwitchConfig::new("correct horse"))
    }

    #[test]
    fn correct_secret_accepted_with_delay() {
        let mut ks = switch();

        let outcome = ks.attempt("10.0.0.1", "correct horse", at_secs(0));

        assert_eq!(
            outcome,
            AttemptOutcome::Accepted { delay: Duration::from_millis(1500) }
        );
        assert!(!ks.is_terminated(), "acceptance alone must not terminate");
    }

    #[test]
    fn wrong_secret_counts_down_attempts() {
        let mut ks = switch();

        assert_eq!(
            ks.attempt("10.0.0.1", "guess one", at_secs(0)),
            AttemptOutcome::InvalidSecret { attempts_remaining: 2 }
        );
        assert_eq!(
            ks.attempt("10.0.0.1", "guess two", at_secs(1)),
            AttemptOutcome::InvalidSecret { attempts_remaining: 1 }
        );
        assert_eq!(
            ks.attempt("10.0.0.1", "guess three", at_secs(2)),
            AttemptOutcome::InvalidSecret { attempts_remaining: 0 }
        );
    }

    #[test]
    fn fourth_attempt_locked_out_even_with_correct_secret() {
        let mut ks = switch();

        for i in 0..3 {
            ks.attempt("10.0.0.1", "wrong", at_secs(i));
        }

        let outcome = ks.attempt("10.0.0.1", "correct horse", at_secs(3));
        assert!(matches!(outcome, AttemptOutcome::LockedOut { .. }));
        assert!(!ks.is_terminated());
    }

    #[test]
    fn lockout_is_per_origin() {
        let mut ks = switch();

        for i in 0..3 {
            ks.attempt("10.0.0.1", "wrong", at_secs(i));
        }

        // A different origin is unaffected
        let outcome = ks.attempt("10.0.0.2", "correct horse", at_secs(3));
        assert!(matches!(outcome, AttemptOutcome::Accepted { .. }));
    }

    #[test]
    fn cooldown_expiry_resets_attempts() {
        let mut ks = switch();

        for i in 0..3 {
            ks.attempt("10.0.0.1", "wrong", at_secs(i));
        }
        assert!(matches!(
            ks.attempt("10.0.0.1", "correct horse", at_secs(10)),
            AttemptOutcome::LockedOut { .. }
        ));

        // Past the 24h window from the last attempt, the count resets
        let after_cooldown = at_secs(10 + 24 * 60 * 60 + 1);
        let outcome = ks.attempt("10.0.0.1", "correct horse", after_cooldown);
        assert!(matches!(outcome, AttemptOutcome::Accepted { .. }));
    }

    #[test]
    fn lockout_window_slides_on_repeated_attempts() {
        let mut ks = switch();

        for i in 0..3 {
            ks.attempt("10.0.0.1", "wrong", at_secs(i));
        }

        // Hammering at hour 23 records the attempt time, so hour 24+1s from
        // the ORIGINAL window is still locked
        let hour = 60 * 60;
        assert!(matches!(
            ks.attempt("10.0.0.1", "wrong", at_secs(23 * hour)),
            AttemptOutcome::LockedOut { .. }
        ));
        assert!(matches!(
            ks.attempt("10.0.0.1", "correct horse", at_secs(24 * hour + 10)),
            AttemptOutcome::LockedOut { .. }
        ));
    }

    #[test]
    fn locked_out_reports_remaining_window() {
        let mut ks = switch();

        for i in 0..3 {
            ks.attempt("10.0.0.1", "wrong", at_secs(i));
        }

        let hour = 60 * 60;
        let outcome = ks.attempt("10.0.0.1", "wrong", at_secs(2 + 4 * hour));
        match outcome {
            AttemptOutcome::LockedOut { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(20 * hour));
            },
            other => panic!("expected LockedOut, got {other:?}"),
        }
    }

    #[test]
    fn attempt_after_termination_is_idempotent() {
        let mut ks = switch();

        assert!(ks.activate());

        assert_eq!(
            ks.attempt("10.0.0.1", "correct horse", at_secs(0)),
            AttemptOutcome::AlreadyTerminated
        );
        assert_eq!(
            ks.attempt("10.0.0.1", "wrong", at_secs(1)),
            AttemptOutcome::AlreadyTerminated
        );
    }

    #[test]
    fn activate_twice_fires_once() {
        let mut ks = switch();

        assert!(ks.activate());
        assert!(!ks.activate());
        assert!(ks.is_terminated());
    }

    #[test]
    fn empty_supplied_secret_is_just_wrong() {
        let mut ks = switch();

        let outcome = ks.attempt("10.0.0.1", "", at_secs(0));
        assert!(matches!(outcome, AttemptOutcome::InvalidSecret { .. }));
    }
}
