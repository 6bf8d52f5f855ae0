//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments (preferred for production) or
//! from sensible defaults (useful for local development and tests).
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the engine easy to embed in tests:
//! a liveness test simply builds a config with a zero eviction timeout and
//! calls the sweep directly.

use std::net::SocketAddr;
use std::time::Duration;

use podium_core::DEFAULT_CODE_LEN;

/// All runtime configuration for the relay server.
///
/// Build this once at startup and share it; the engine keeps its own copy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port the WebSocket listener binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface. Use `127.0.0.1`
    /// when a reverse proxy terminates TLS in front of the server.
    pub bind_addr: SocketAddr,

    /// Length of server-generated room codes. Clamped to the protocol's
    /// 4–6 character range at generation time.
    pub code_length: usize,

    /// How often the probe sweep sends a liveness probe to every occupied
    /// slot. Receiving a probe obligates the peer to answer `probe_ack`.
    pub probe_interval: Duration,

    /// Elapsed time since a peer's last probe acknowledgment after which the
    /// eviction sweep considers it stale and force-disconnects it. Must be
    /// comfortably longer than `probe_interval`.
    pub eviction_timeout: Duration,

    /// How often the eviction sweep runs.
    pub eviction_interval: Duration,

    /// How often the expiry sweep runs.
    pub expiry_interval: Duration,

    /// Maximum age of a room whose slots are both empty. Guards against
    /// orphaned entries that evaded the eviction sweep's delete path.
    pub room_max_age: Duration,
}

impl Default for ServerConfig {
    /// Returns a `ServerConfig` suitable for local development.
    ///
    /// | Field             | Default       |
    /// |-------------------|---------------|
    /// | bind_addr         | `0.0.0.0:8320`|
    /// | code_length       | 5             |
    /// | probe_interval    | 30 seconds    |
    /// | eviction_timeout  | 90 seconds    |
    /// | eviction_interval | 60 seconds    |
    /// | expiry_interval   | 300 seconds   |
    /// | room_max_age      | 1 hour        |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address string.
            bind_addr: "0.0.0.0:8320".parse().unwrap(),
            code_length: DEFAULT_CODE_LEN,
            probe_interval: Duration::from_secs(30),
            eviction_timeout: Duration::from_secs(90),
            eviction_interval: Duration::from_secs(60),
            expiry_interval: Duration::from_secs(300),
            room_max_age: Duration::from_secs(3600),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind_port_is_8320() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8320);
    }

    #[test]
    fn test_default_code_length_is_five() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.code_length, 5);
    }

    #[test]
    fn test_default_eviction_timeout_exceeds_probe_interval() {
        // A timeout shorter than the probe interval would evict healthy
        // peers that simply have not been probed yet.
        let cfg = ServerConfig::default();
        assert!(cfg.eviction_timeout > cfg.probe_interval);
    }

    #[test]
    fn test_default_eviction_interval_exceeds_probe_interval() {
        let cfg = ServerConfig::default();
        assert!(cfg.eviction_interval > cfg.probe_interval);
    }

    #[test]
    fn test_config_can_be_cloned() {
        let cfg = ServerConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.bind_addr, cloned.bind_addr);
        assert_eq!(cfg.room_max_age, cloned.room_max_age);
    }
}
