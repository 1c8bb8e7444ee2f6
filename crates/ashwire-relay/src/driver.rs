//! Relay driver.
//!
//! Ties together the session registry, envelope store, and kill switch
//! behind a single coordination boundary. The driver is pure logic: it
//! consumes [`RelayEvent`]s and produces [`RelayAction`]s for the runtime to
//! execute, so every state mutation happens inside one `process_event` call
//! and a wipe can never race a registration.

use std::time::Duration;

use ashwire_crypto::KeyPair;
use ashwire_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{
        control::KillSwitchReply,
        envelope::{EnvelopeDeliver, History, HistoryEntry},
        keys::{PeerKey, RelayKey},
    },
};
use bytes::Bytes;

use crate::{
    env::Environment,
    envelope::{Envelope, EnvelopeStore},
    kill_switch::{AttemptOutcome, KillSwitch, KillSwitchConfig},
    registry::{Session, SessionRegistry},
    relay_error::RelayError,
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Kill-switch secret and limits.
    pub kill_switch: KillSwitchConfig,
    /// Maximum envelopes retained for history replay.
    pub history_capacity: usize,
    /// Maximum envelopes replayed to a newly joined session.
    pub history_replay_limit: usize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl RelayConfig {
    /// Create a configuration with default capacities.
    #[must_use]
    pub fn new(kill_switch: KillSwitchConfig) -> Self {
        Self { kill_switch, history_capacity: 64, history_replay_limit: 4, max_connections: 10_000 }
    }
}

/// Events that the relay driver processes.
///
/// These are produced by the external runtime (tests or production).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique session ID assigned by the runtime
        session_id: u64,
        /// Client network origin (used for kill-switch rate limiting)
        origin: String,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Session that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Session that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// The scheduled kill-switch delay elapsed, or an immediate activation
    /// was requested (shutdown signal). Not cancellable.
    TerminationDue,
}

/// Actions that the relay driver produces.
///
/// These are executed by runtime-specific code.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Send a frame to every registered session except one
    Broadcast {
        /// Frame to send
        frame: Frame,
        /// Optional session to exclude (usually the sender)
        exclude_session: Option<u64>,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Close every connection (kill-switch teardown)
    CloseAllConnections {
        /// Reason for closure
        reason: String,
    },

    /// Feed [`RelayEvent::TerminationDue`] back after the delay elapses
    ScheduleTermination {
        /// Delay before termination
        delay: Duration,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for relay actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based relay driver.
///
/// Orchestrates session lifecycle, key exchange, envelope forwarding, and
/// the kill switch. Once the switch has fired, every event of any kind
/// collapses to a bare not-found answer - the relay becomes
/// indistinguishable from a service that never existed.
pub struct RelayDriver<E>
where
    E: Environment,
{
    /// Session registry (single owner of session records)
    registry: SessionRegistry,
    /// Envelope store (bounded history)
    envelopes: EnvelopeStore,
    /// Kill-switch state machine
    kill_switch: KillSwitch<E::Instant>,
    /// The relay's own keypair. Discarded on termination.
    relay_keys: Option<KeyPair>,
    /// Environment (time, RNG)
    env: E,
    /// Relay configuration
    config: RelayConfig,
}

impl<E> RelayDriver<E>
where
    E: Environment,
{
    /// Create a new relay driver.
    ///
    /// Generates the relay's own keypair from the environment RNG.
    pub fn new(env: E, config: RelayConfig) -> Self {
        let relay_keys = Some(ashwire_crypto::generate_keypair(env.random_seed()));

        Self {
            registry: SessionRegistry::new(),
            envelopes: EnvelopeStore::new(config.history_capacity),
            kill_switch: KillSwitch::new(&config.kill_switch),
            relay_keys,
            env,
            config,
        }
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the main entry point for the relay driver.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        if self.kill_switch.is_terminated() {
            return Ok(self.handle_while_terminated(&event));
        }

        match event {
            RelayEvent::ConnectionAccepted { session_id, origin } => {
                self.handle_connection_accepted(session_id, origin)
            },
            RelayEvent::FrameReceived { session_id, frame } => {
                Ok(self.handle_frame_received(session_id, &frame))
            },
            RelayEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            RelayEvent::TerminationDue => Ok(self.handle_termination_due()),
        }
    }

    /// Answer every post-termination event with a bare not-found.
    ///
    /// No distinct "terminated" signal leaves the process; the service is
    /// indistinguishable from one that never existed.
    fn handle_while_terminated(&self, event: &RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::ConnectionAccepted { session_id, .. } => {
                let mut actions = self.not_found_response(*session_id);
                actions.push(RelayAction::CloseConnection {
                    session_id: *session_id,
                    reason: "connection closed".to_string(),
                });
                actions
            },
            RelayEvent::FrameReceived { session_id, .. } => self.not_found_response(*session_id),
            // Nothing left to clean up; activation is idempotent
            RelayEvent::ConnectionClosed { .. } | RelayEvent::TerminationDue => Vec::new(),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
        origin: String,
    ) -> Result<Vec<RelayAction>, RelayError> {
        if self.registry.len() >= self.config.max_connections {
            return Ok(vec![RelayAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        let connected_at = self.env.wall_clock_ms();
        if !self.registry.register(session_id, Session::new(connected_at, origin)) {
            // u64 collision from a CSPRNG; close and let the client retry
            return Ok(vec![RelayAction::CloseConnection {
                session_id,
                reason: "session id collision".to_string(),
            }]);
        }

        let mut actions = vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} accepted"),
        }];

        // Push the relay's own key so the new session can encrypt immediately
        if let Some(keys) = &self.relay_keys {
            let payload = Payload::RelayKey(RelayKey { key: keys.public.as_bytes().to_vec() });
            let mut header = FrameHeader::new(Opcode::RelayKey);
            header.set_recipient_id(session_id);
            let frame = payload.into_frame(header)?;
            actions.push(RelayAction::SendToSession { session_id, frame });
        }

        // Replay recent traffic for catch-up, excluding the session's own
        // prior messages
        let entries: Vec<HistoryEntry> = self
            .envelopes
            .recent(self.config.history_replay_limit, session_id)
            .map(|e| HistoryEntry {
                id: e.id,
                ciphertext: e.ciphertext.to_vec(),
                sender_id: e.sender_id,
                display_name: e.display_name.clone(),
                timestamp: e.timestamp,
            })
            .collect();

        if !entries.is_empty() {
            let count = entries.len();
            let payload = Payload::History(History { entries });
            let mut header = FrameHeader::new(Opcode::History);
            header.set_recipient_id(session_id);
            let frame = payload.into_frame(header)?;
            actions.push(RelayAction::SendToSession { session_id, frame });
            actions.push(RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("replayed {count} envelopes to session {session_id}"),
            });
        }

        Ok(actions)
    }

    /// Handle a frame received from a connection.
    fn handle_frame_received(&mut self, session_id: u64, frame: &Frame) -> Vec<RelayAction> {
        if !self.registry.contains(session_id) {
            // Race with disconnect: the connection task may still drain
            // frames after unregistration. Fail soft.
            return vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("dropping frame from unregistered session {session_id}"),
            }];
        }

        let result = match frame.header.opcode_enum() {
            Some(Opcode::ClientKey) => self.handle_client_key(session_id, frame),
            Some(Opcode::PeerKeyRequest) => self.handle_peer_key_request(session_id, frame),
            Some(Opcode::RelayKeyRequest) => self.handle_relay_key_request(session_id),
            Some(Opcode::EnvelopeSubmit) => self.handle_envelope_submit(session_id, frame),
            Some(Opcode::LegacyMessage) => Err(RelayError::PlaintextRejected),
            Some(Opcode::KillSwitch) => self.handle_kill_switch(session_id, frame),
            Some(_) => {
                // Server-to-client opcode arriving inbound
                Err(RelayError::Protocol(format!(
                    "unexpected opcode {:#06x} from client",
                    frame.header.opcode()
                )))
            },
            None => Err(RelayError::Protocol(format!(
                "unknown opcode {:#06x}",
                frame.header.opcode()
            ))),
        };

        match result {
            Ok(actions) => actions,
            Err(error) => self.make_error_response(session_id, &error),
        }
    }

    /// Handle a client submitting its own public key.
    ///
    /// Stores the key and fans it out to every other session so peers can
    /// encrypt to this one directly.
    fn handle_client_key(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let key = match Payload::from_frame(frame)? {
            Payload::ClientKey(payload) => payload.key,
            _ => return Err(RelayError::Protocol("expected ClientKey payload".to_string())),
        };

        if key.is_empty() {
            return Err(RelayError::Protocol("empty key material".to_string()));
        }

        if !self.registry.set_public_key(session_id, key.clone()) {
            // Session vanished between frame receipt and key storage
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("key submitted for vanished session {session_id}"),
            }]);
        }

        let payload = Payload::PeerKey(PeerKey { session_id, key });
        let mut header = FrameHeader::new(Opcode::PeerKey);
        header.set_sender_id(session_id);
        let fan_out = payload.into_frame(header)?;

        Ok(vec![
            RelayAction::Broadcast { frame: fan_out, exclude_session: Some(session_id) },
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("public key registered for session {session_id}"),
            },
        ])
    }

    /// Handle an on-demand peer key lookup.
    fn handle_peer_key_request(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let target = match Payload::from_frame(frame)? {
            Payload::PeerKeyRequest(payload) => payload.session_id,
            _ => return Err(RelayError::Protocol("expected PeerKeyRequest payload".to_string())),
        };

        let session =
            self.registry.get(target).ok_or(RelayError::UnknownSession(target))?;
        let key = session.public_key.clone().ok_or(RelayError::KeyNotAvailable(target))?;

        let payload = Payload::PeerKey(PeerKey { session_id: target, key });
        let mut header = FrameHeader::new(Opcode::PeerKey);
        header.set_recipient_id(session_id);
        let frame = payload.into_frame(header)?;

        Ok(vec![RelayAction::SendToSession { session_id, frame }])
    }

    /// Handle an on-demand relay key lookup.
    fn handle_relay_key_request(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let Some(keys) = &self.relay_keys else {
            let payload = Payload::Error(ErrorPayload::relay_key_unavailable());
            let frame = payload.into_frame(FrameHeader::new(Opcode::Error))?;
            return Ok(vec![RelayAction::SendToSession { session_id, frame }]);
        };

        let payload = Payload::RelayKey(RelayKey { key: keys.public.as_bytes().to_vec() });
        let mut header = FrameHeader::new(Opcode::RelayKey);
        header.set_recipient_id(session_id);
        let frame = payload.into_frame(header)?;

        Ok(vec![RelayAction::SendToSession { session_id, frame }])
    }

    /// Handle an encrypted envelope submission.
    ///
    /// The ciphertext is forwarded byte-identical. A resolvable recipient
    /// gets a directed delivery; anything else falls back to broadcast
    /// (documented policy, never an error to the sender).
    fn handle_envelope_submit(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let submit = match Payload::from_frame(frame)? {
            Payload::EnvelopeSubmit(payload) => payload,
            _ => return Err(RelayError::Protocol("expected EnvelopeSubmit payload".to_string())),
        };

        // The relay accepts ciphertext only. An empty blob is structurally
        // indistinguishable from a non-message and is rejected the same way
        // plaintext is.
        if submit.ciphertext.is_empty() {
            return Err(RelayError::PlaintextRejected);
        }

        let envelope_id = self.env.random_u64();
        let timestamp = self.env.wall_clock_ms();
        let display_name = if submit.display_name.is_empty() {
            "Anonymous".to_string()
        } else {
            submit.display_name
        };

        let resolved_recipient = submit.recipient_id.filter(|id| self.registry.contains(*id));
        let delivered = resolved_recipient.is_some();

        let payload = Payload::EnvelopeDeliver(EnvelopeDeliver {
            id: envelope_id,
            ciphertext: submit.ciphertext.clone(),
            sender_id: session_id,
            display_name: display_name.clone(),
            timestamp,
        });

        let mut header = FrameHeader::new(Opcode::EnvelopeDeliver);
        header.set_sender_id(session_id);
        header.set_envelope_id(envelope_id);
        header.set_timestamp_ms(timestamp);
        if let Some(recipient) = resolved_recipient {
            header.set_recipient_id(recipient);
        }
        let deliver = payload.into_frame(header)?;

        let mut actions = Vec::new();
        match resolved_recipient {
            Some(recipient) => {
                actions.push(RelayAction::SendToSession { session_id: recipient, frame: deliver });
                actions.push(RelayAction::Log {
                    level: LogLevel::Debug,
                    message: format!("envelope {envelope_id} forwarded to session {recipient}"),
                });
            },
            None => {
                if let Some(requested) = submit.recipient_id {
                    actions.push(RelayAction::Log {
                        level: LogLevel::Debug,
                        message: format!(
                            "recipient {requested} not connected, broadcasting envelope {envelope_id}"
                        ),
                    });
                }
                actions.push(RelayAction::Broadcast {
                    frame: deliver,
                    exclude_session: Some(session_id),
                });
                actions.push(RelayAction::Log {
                    level: LogLevel::Debug,
                    message: format!("envelope {envelope_id} broadcast"),
                });
            },
        }

        self.envelopes.record(Envelope {
            id: envelope_id,
            ciphertext: Bytes::from(submit.ciphertext),
            sender_id: session_id,
            recipient_id: submit.recipient_id,
            display_name,
            timestamp,
            delivered,
        });

        Ok(actions)
    }

    /// Handle a kill-switch activation attempt.
    fn handle_kill_switch(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<RelayAction>, RelayError> {
        let attempt = match Payload::from_frame(frame)? {
            Payload::KillSwitch(payload) => payload,
            _ => return Err(RelayError::Protocol("expected KillSwitch payload".to_string())),
        };

        let origin = self
            .registry
            .get(session_id)
            .map(|s| s.origin.clone())
            .ok_or(RelayError::UnknownSession(session_id))?;

        let now = self.env.now();
        let outcome = self.kill_switch.attempt(&origin, &attempt.secret, now);

        let mut actions = Vec::new();
        let reply = match outcome {
            AttemptOutcome::Accepted { delay } => {
                actions.push(RelayAction::ScheduleTermination { delay });
                actions.push(RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "kill switch accepted from {origin}, terminating in {delay:?}"
                    ),
                });
                KillSwitchReply::accepted(delay.as_millis() as u64)
            },
            AttemptOutcome::InvalidSecret { attempts_remaining } => {
                actions.push(RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "invalid kill switch attempt from {origin}, {attempts_remaining} attempts remaining"
                    ),
                });
                KillSwitchReply::invalid_secret(attempts_remaining)
            },
            AttemptOutcome::LockedOut { retry_after } => {
                actions.push(RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("kill switch attempt from locked-out origin {origin}"),
                });
                KillSwitchReply::locked_out(retry_after.as_millis() as u64)
            },
            AttemptOutcome::AlreadyTerminated => {
                return Ok(self.not_found_response(session_id));
            },
        };

        let payload = Payload::KillSwitchReply(reply);
        let mut header = FrameHeader::new(Opcode::KillSwitchReply);
        header.set_recipient_id(session_id);
        let frame = payload.into_frame(header)?;

        // Reply first, then the scheduled termination action
        let mut result = vec![RelayAction::SendToSession { session_id, frame }];
        result.extend(actions);
        Ok(result)
    }

    /// Handle a connection being closed.
    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<RelayAction> {
        if self.registry.unregister(session_id).is_some() {
            vec![RelayAction::Log {
                level: LogLevel::Info,
                message: format!("session {session_id} closed: {reason}"),
            }]
        } else {
            Vec::new()
        }
    }

    /// Fire the kill switch: wipe everything, close everything.
    ///
    /// Idempotent; only the first call produces teardown actions. After
    /// this, [`Self::handle_while_terminated`] answers all traffic.
    fn handle_termination_due(&mut self) -> Vec<RelayAction> {
        if !self.kill_switch.activate() {
            return Vec::new();
        }

        self.registry.wipe();
        self.envelopes.wipe();
        // Dropping the keypair zeroizes the secret half
        self.relay_keys = None;

        vec![
            RelayAction::CloseAllConnections { reason: "connection closed".to_string() },
            RelayAction::Log {
                level: LogLevel::Warn,
                message: "kill switch fired: all in-memory state destroyed".to_string(),
            },
        ]
    }

    /// Convert a driver error into an error frame for the sender.
    fn make_error_response(&self, session_id: u64, error: &RelayError) -> Vec<RelayAction> {
        let payload = match error {
            RelayError::ServiceTerminated => ErrorPayload::not_found(),
            RelayError::UnknownSession(id) => ErrorPayload::unknown_session(*id),
            RelayError::KeyNotAvailable(id) => ErrorPayload::key_not_available(*id),
            RelayError::PlaintextRejected => ErrorPayload::plaintext_rejected(),
            RelayError::Protocol(msg) => ErrorPayload::invalid_payload(msg.clone()),
        };

        match Payload::Error(payload).into_frame(FrameHeader::new(Opcode::Error)) {
            Ok(frame) => vec![RelayAction::SendToSession { session_id, frame }, RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("request from session {session_id} rejected: {error}"),
            }],
            Err(e) => vec![RelayAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode error response: {e}"),
            }],
        }
    }

    /// Bare not-found answer for post-termination traffic.
    fn not_found_response(&self, session_id: u64) -> Vec<RelayAction> {
        match Payload::Error(ErrorPayload::not_found())
            .into_frame(FrameHeader::new(Opcode::Error))
        {
            Ok(frame) => vec![RelayAction::SendToSession { session_id, frame }],
            Err(_) => Vec::new(),
        }
    }

    /// Retained envelope history, newest first.
    ///
    /// Mirrors the catch-up replay: at most `limit` entries, excluding those
    /// sent by `exclude_sender`.
    pub fn history(
        &self,
        limit: usize,
        exclude_sender: u64,
    ) -> Result<Vec<Envelope>, RelayError> {
        if self.kill_switch.is_terminated() {
            return Err(RelayError::ServiceTerminated);
        }

        Ok(self.envelopes.recent(limit, exclude_sender).cloned().collect())
    }

    /// All registered session ids in insertion order.
    pub fn session_ids(&self) -> Vec<u64> {
        self.registry.session_ids().collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// True once the kill switch has fired.
    pub fn is_terminated(&self) -> bool {
        self.kill_switch.is_terminated()
    }

    /// The relay's own public key. `None` after termination.
    pub fn relay_public_key(&self) -> Option<ashwire_crypto::PublicKey> {
        self.relay_keys.as_ref().map(|k| k.public)
    }

    /// Number of envelopes currently retained in history.
    pub fn history_len(&self) -> usize {
        self.envelopes.len()
    }
}

impl<E> std::fmt::Debug for RelayDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayDriver")
            .field("session_count", &self.registry.len())
            .field("history_len", &self.envelopes.len())
            .field("terminated", &self.kill_switch.is_terminated())
            .finish()
    }
}
