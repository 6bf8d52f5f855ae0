//! Podium relay server — entry point.
//!
//! This binary pairs presentation displays with remote controllers into
//! ephemeral rooms addressed by short human-typable codes, and relays typed
//! control messages between the two peers of each room over WebSocket.
//!
//! # Usage
//!
//! ```text
//! podium-server [OPTIONS]
//!
//! Options:
//!   --bind              <ADDR>  Listener bind address [default: 0.0.0.0]
//!   --port              <PORT>  Listener port [default: 8320]
//!   --code-length       <N>     Generated room code length, 4-6 [default: 5]
//!   --probe-interval    <SECS>  Liveness probe period [default: 30]
//!   --eviction-timeout  <SECS>  Silence before a peer is stale [default: 90]
//!   --eviction-interval <SECS>  Eviction sweep period [default: 60]
//!   --expiry-interval   <SECS>  Room expiry sweep period [default: 300]
//!   --room-max-age      <SECS>  Max lifetime of an empty room [default: 3600]
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also be set through an environment variable; CLI args take
//! precedence when both are present.
//!
//! | Variable                   | Default   | Description                     |
//! |----------------------------|-----------|---------------------------------|
//! | `PODIUM_BIND`              | `0.0.0.0` | Listener bind address           |
//! | `PODIUM_PORT`              | `8320`    | Listener port                   |
//! | `PODIUM_CODE_LENGTH`       | `5`       | Generated room code length      |
//! | `PODIUM_PROBE_INTERVAL`    | `30`      | Probe period (secs)             |
//! | `PODIUM_EVICTION_TIMEOUT`  | `90`      | Staleness threshold (secs)      |
//! | `PODIUM_EVICTION_INTERVAL` | `60`      | Eviction sweep period (secs)    |
//! | `PODIUM_EXPIRY_INTERVAL`   | `300`     | Expiry sweep period (secs)      |
//! | `PODIUM_ROOM_MAX_AGE`      | `3600`    | Empty-room lifetime (secs)      |
//!
//! # Architecture overview
//!
//! ```text
//! Display / Controller  (JSON over WebSocket)
//!       ↕
//! podium-server  ← this process
//!   domain/          ServerConfig
//!   application/     RelayEngine, room table, registry, sweeps
//!   infrastructure/  WebSocket accept loop, outbound lanes
//!       ↕
//! podium-core  (protocol types, room-code domain)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podium_core::{MAX_CODE_LEN, MIN_CODE_LEN};
use podium_server::application::{spawn_supervisor, PeerTransport, RelayEngine};
use podium_server::domain::ServerConfig;
use podium_server::infrastructure::{run_server, ChannelTransport};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Room pairing and message relay server for presentation remote control.
#[derive(Debug, Parser)]
#[command(
    name = "podium-server",
    about = "Pairs displays with controllers into code-addressed rooms and relays control messages",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` for local-only access.
    #[arg(long, default_value = "0.0.0.0", env = "PODIUM_BIND")]
    bind: String,

    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 8320, env = "PODIUM_PORT")]
    port: u16,

    /// Length of generated room codes (4 to 6 characters).
    #[arg(long, default_value_t = 5, env = "PODIUM_CODE_LENGTH")]
    code_length: usize,

    /// Liveness probe period in seconds.
    #[arg(long, default_value_t = 30, env = "PODIUM_PROBE_INTERVAL")]
    probe_interval: u64,

    /// Seconds of probe silence after which a peer is considered stale and
    /// evicted from its room.
    #[arg(long, default_value_t = 90, env = "PODIUM_EVICTION_TIMEOUT")]
    eviction_timeout: u64,

    /// Eviction sweep period in seconds.
    #[arg(long, default_value_t = 60, env = "PODIUM_EVICTION_INTERVAL")]
    eviction_interval: u64,

    /// Room expiry sweep period in seconds.
    #[arg(long, default_value_t = 300, env = "PODIUM_EXPIRY_INTERVAL")]
    expiry_interval: u64,

    /// Maximum lifetime in seconds of a room whose slots are both empty.
    #[arg(long, default_value_t = 3600, env = "PODIUM_ROOM_MAX_AGE")]
    room_max_age: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address or
    /// `--code-length` is outside the 4-6 range.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;
        let bind_addr = SocketAddr::new(ip, self.port);

        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&self.code_length) {
            anyhow::bail!(
                "code length must be between {MIN_CODE_LEN} and {MAX_CODE_LEN}, got {}",
                self.code_length
            );
        }

        Ok(ServerConfig {
            bind_addr,
            code_length: self.code_length,
            probe_interval: Duration::from_secs(self.probe_interval),
            eviction_timeout: Duration::from_secs(self.eviction_timeout),
            eviction_interval: Duration::from_secs(self.eviction_interval),
            expiry_interval: Duration::from_secs(self.expiry_interval),
            room_max_age: Duration::from_secs(self.room_max_age),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// Startup sequence:
///
/// 1. Initialize `tracing_subscriber`; the level is controlled by `RUST_LOG`
///    and defaults to `info`.
/// 2. Parse CLI arguments and build the [`ServerConfig`].
/// 3. Wire the engine to the WebSocket transport.
/// 4. Spawn the sweep supervisor and the Ctrl+C handler.
/// 5. Run the accept loop until the shutdown flag clears.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_server_config()?;

    info!(
        "podium relay server starting — bind={}, code_length={}",
        config.bind_addr, config.code_length
    );

    let transport = Arc::new(ChannelTransport::new());
    let engine = Arc::new(RelayEngine::new(
        config.clone(),
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
    ));

    // Shared shutdown flag, cleared by the Ctrl+C handler. The accept loop
    // and the sweep loops each poll it on their own cadence.
    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let sweeps = spawn_supervisor(
        Arc::clone(&engine),
        config.probe_interval,
        config.eviction_interval,
        config.expiry_interval,
        Arc::clone(&running),
    );

    run_server(&config, Arc::clone(&engine), transport, running).await?;

    // The accept loop has exited; notify and drop the remaining peers, then
    // stop the sweep loops (they would also notice the cleared flag within
    // one tick each).
    engine.shutdown().await;
    for handle in sweeps {
        handle.abort();
    }

    info!("podium relay server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
