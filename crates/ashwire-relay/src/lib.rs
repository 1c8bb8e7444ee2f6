//! Ashwire production relay.
//!
//! Production server implementation using Quinn for QUIC transport, Tokio
//! for async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! This crate provides production "glue" that wraps the action-based
//! [`RelayDriver`] with real I/O. The driver follows the Sans-IO pattern:
//! pure logic consuming [`RelayEvent`]s and emitting [`RelayAction`]s, with
//! all shared state (session registry, envelope history, kill-switch
//! attempt table) mutated inside a single `process_event` call. The
//! [`Relay`] runtime executes the actions using Quinn QUIC and Tokio.
//!
//! # Components
//!
//! - [`RelayDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`Relay`]: Production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn library
//! - [`SystemEnv`]: Production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
pub mod env;
pub mod envelope;
mod error;
pub mod kill_switch;
pub mod registry;
mod relay_error;
mod transport;

use std::{collections::HashMap, sync::Arc};

use ashwire_proto::{Frame, FrameHeader};
use bytes::BytesMut;
pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use env::{Environment, SystemEnv};
pub use envelope::{Envelope, EnvelopeStore};
pub use error::ServerError;
pub use kill_switch::{AttemptOutcome, KillSwitch, KillSwitchConfig};
pub use registry::{Session, SessionRegistry};
pub use relay_error::RelayError;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};
use zerocopy::FromBytes;

/// Shared state for all connections.
///
/// This holds connection and stream maps for message routing.
struct SharedState {
    /// Map of session ID to QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Map of session ID to persistent outbound stream.
    /// All messages to a client go through this single stream, ensuring
    /// per-recipient ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Relay configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct RelayRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (kill switch, history, limits)
    pub relay: RelayConfig,
}

impl RelayRuntimeConfig {
    /// Create a runtime configuration with default bind address.
    #[must_use]
    pub fn new(relay: RelayConfig) -> Self {
        Self { bind_address: "0.0.0.0:4433".to_string(), cert_path: None, key_path: None, relay }
    }
}

/// Production Ashwire relay.
///
/// Wraps `RelayDriver` with Quinn QUIC transport and system environment.
pub struct Relay {
    /// The action-based relay driver
    driver: RelayDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
}

impl Relay {
    /// Create and bind a new relay.
    pub fn bind(config: RelayRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = RelayDriver::new(env.clone(), config.relay);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, env })
    }

    /// Run the relay, accepting connections and processing frames.
    ///
    /// Runs until a shutdown signal arrives, at which point the kill switch
    /// fires immediately (state wipe, all connections closed) and the
    /// method returns.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Relay starting on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        // Created once: re-arming per loop iteration could drop a signal
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.transport.accept() => match result {
                    Ok(conn) => {
                        let driver = Arc::clone(&driver);
                        let shared = Arc::clone(&shared);
                        let env = env.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, driver, shared, env).await {
                                tracing::error!("Connection error: {}", e);
                            }
                        });
                    },
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    },
                },
                () = &mut shutdown => {
                    tracing::warn!("shutdown signal received, firing kill switch");
                    fire_termination(&driver, &shared).await;
                    return Ok(());
                },
            }
        }
    }

    /// Local address the relay is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                // Fall back to SIGINT only
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for SIGINT: {}", e);
                    std::future::pending::<()>().await;
                }
                return;
            },
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("failed to listen for SIGINT: {}", e);
                    std::future::pending::<()>().await;
                }
            },
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: Arc<tokio::sync::Mutex<RelayDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();
    let origin = conn.remote_addr().ip().to_string();

    tracing::debug!("New connection: {} from {}", session_id, origin);

    let outbound_stream = conn
        .open_uni()
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to open outbound stream: {e}")))?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver_guard = driver.lock().await;
        let actions =
            driver_guard.process_event(RelayEvent::ConnectionAccepted { session_id, origin })?;
        execute_actions(&mut driver_guard, &driver, &env, actions, &shared).await?;
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);
                let env = env.clone();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_stream(session_id, send, recv, driver, &shared, env).await
                    {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection closed: {}", e);
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }

    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    {
        let mut driver_guard = driver.lock().await;
        let actions = driver_guard.process_event(RelayEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        execute_actions(&mut driver_guard, &driver, &env, actions, &shared).await?;
    }

    Ok(())
}

/// Handle a single bidirectional stream.
async fn handle_stream(
    session_id: u64,
    send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: Arc<tokio::sync::Mutex<RelayDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    drop(send); // replies go over the persistent outbound stream

    let mut buf = BytesMut::with_capacity(8192);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let header: &FrameHeader = match FrameHeader::ref_from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!("Invalid frame header");
                break;
            },
        };

        let payload_size = header.payload_size() as usize;

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Frame decode error: {}", e);
                break;
            },
        };

        let mut driver_guard = driver.lock().await;
        match driver_guard.process_event(RelayEvent::FrameReceived { session_id, frame }) {
            Ok(actions) => {
                execute_actions(&mut driver_guard, &driver, &env, actions, shared).await?;
            },
            Err(e) => {
                tracing::warn!("Frame processing error: {}", e);
            },
        }
    }

    Ok(())
}

/// Execute relay actions.
///
/// `driver_guard` is the already-held lock (used for broadcast fan-out
/// resolution); `driver_handle` is the shared handle for tasks spawned by
/// `ScheduleTermination`, which re-acquire the lock after the delay.
async fn execute_actions(
    driver_guard: &mut RelayDriver<SystemEnv>,
    driver_handle: &Arc<tokio::sync::Mutex<RelayDriver<SystemEnv>>>,
    env: &SystemEnv,
    actions: Vec<RelayAction>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    for action in actions {
        match action {
            RelayAction::SendToSession { session_id, frame } => {
                let mut buf = Vec::new();
                frame.encode(&mut buf).map_err(|e| ServerError::Protocol(e.to_string()))?;

                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&session_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!("SendToSession write failed for {}: {}", session_id, e);
                    }
                } else {
                    tracing::debug!("SendToSession: session {} not found", session_id);
                }
            },

            RelayAction::Broadcast { frame, exclude_session } => {
                let sessions = driver_guard.session_ids();

                let mut buf = Vec::new();
                frame.encode(&mut buf).map_err(|e| ServerError::Protocol(e.to_string()))?;

                let streams = shared.outbound_streams.read().await;
                for session_id in sessions {
                    if Some(session_id) != exclude_session {
                        if let Some(stream_mutex) = streams.get(&session_id) {
                            let mut stream = stream_mutex.lock().await;
                            if let Err(e) = stream.write_all(&buf).await {
                                tracing::warn!(
                                    "Broadcast write failed for {}: {}",
                                    session_id,
                                    e
                                );
                            }
                        }
                    }
                }
            },

            RelayAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
                drop(connections);
                let mut streams = shared.outbound_streams.write().await;
                streams.remove(&session_id);
            },

            RelayAction::CloseAllConnections { reason } => {
                close_all_connections(shared, &reason).await;
            },

            RelayAction::ScheduleTermination { delay } => {
                let driver = Arc::clone(driver_handle);
                let shared = Arc::clone(shared);
                let env = env.clone();

                tokio::spawn(async move {
                    env.sleep(delay).await;
                    fire_termination(&driver, &shared).await;
                });
            },

            RelayAction::Log { level, message } => emit_log(level, &message),
        }
    }

    Ok(())
}

/// Feed `TerminationDue` into the driver and execute the teardown.
///
/// Safe to call more than once; the driver's activation is idempotent and
/// subsequent calls produce no actions.
async fn fire_termination(
    driver: &Arc<tokio::sync::Mutex<RelayDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
) {
    let actions = {
        let mut driver_guard = driver.lock().await;
        match driver_guard.process_event(RelayEvent::TerminationDue) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::error!("Termination processing error: {}", e);
                return;
            },
        }
    };

    for action in actions {
        match action {
            RelayAction::CloseAllConnections { reason } => {
                close_all_connections(shared, &reason).await;
            },
            RelayAction::Log { level, message } => emit_log(level, &message),
            // Teardown produces no other action kinds
            _ => {},
        }
    }
}

/// Close and forget every connection.
async fn close_all_connections(shared: &Arc<SharedState>, reason: &str) {
    let mut connections = shared.connections.write().await;
    for (_, conn) in connections.drain() {
        conn.close(0u32.into(), reason.as_bytes());
    }
    drop(connections);

    let mut streams = shared.outbound_streams.write().await;
    streams.clear();
}

/// Map driver log actions onto tracing.
fn emit_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}
