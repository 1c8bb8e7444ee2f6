//! Ashwire relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! ASHWIRE_SECRET=... ashwire-relay --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate (production)
//! ASHWIRE_SECRET=... ashwire-relay --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```
//!
//! SIGINT/SIGTERM fire the kill switch before exit: all in-memory state is
//! destroyed on the way down.

use std::time::Duration;

use ashwire_relay::{KillSwitchConfig, Relay, RelayConfig, RelayRuntimeConfig, ServerError};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Ashwire encrypted-message relay
#[derive(Parser, Debug)]
#[command(name = "ashwire-relay")]
#[command(about = "Blind encrypted-message relay with operator kill switch")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Kill-switch shared secret
    #[arg(long, env = "ASHWIRE_SECRET", hide_env_values = true)]
    secret: String,

    /// Failed kill-switch attempts allowed per origin before lockout
    #[arg(long, env = "ASHWIRE_MAX_ATTEMPTS", default_value = "3")]
    max_attempts: u32,

    /// Kill-switch lockout cooldown in seconds
    #[arg(long, env = "ASHWIRE_COOLDOWN_SECS", default_value = "86400")]
    cooldown_secs: u64,

    /// Delay between kill-switch acceptance and teardown, in milliseconds
    #[arg(long, env = "ASHWIRE_ACTIVATION_DELAY_MS", default_value = "1500")]
    activation_delay_ms: u64,

    /// Maximum envelopes retained for history replay
    #[arg(long, env = "ASHWIRE_HISTORY_CAPACITY", default_value = "64")]
    history_capacity: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Ashwire relay starting");
    tracing::info!("Binding to {}", args.bind);

    if args.secret.trim().is_empty() {
        return Err(ServerError::Config("kill-switch secret must not be empty".to_string()).into());
    }

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let relay_config = RelayConfig {
        history_capacity: args.history_capacity,
        max_connections: args.max_connections,
        ..RelayConfig::new(KillSwitchConfig {
            secret: args.secret,
            max_attempts: args.max_attempts,
            cooldown: Duration::from_secs(args.cooldown_secs),
            activation_delay: Duration::from_millis(args.activation_delay_ms),
        })
    };

    let config = RelayRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        relay: relay_config,
    };

    let relay = Relay::bind(config)?;

    tracing::info!("Relay listening on {}", relay.local_addr()?);

    relay.run().await?;

    Ok(())
}
