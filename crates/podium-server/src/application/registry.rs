//! Connection registry: live peer handles and their liveness timestamps.
//!
//! The registry is the server's in-memory database of every currently open
//! connection. Each entry tracks:
//!
//! - The peer's connection id, declared role, and assigned room code.
//! - Liveness state: when the last probe was sent and when the last
//!   acknowledgment arrived.
//!
//! A peer appears here the moment its transport connects — before it has
//! declared a role — and disappears when the transport closes or a sweep
//! evicts it. Updates are last-write-wins per peer id; there are no ordering
//! guarantees beyond that.
//!
//! The registry is a plain struct: synchronization is the engine's job (both
//! shared structures live behind one mutex, see `engine`).

use std::collections::HashMap;
use std::time::Instant;

use podium_core::{PeerId, PeerRole};
use serde::Serialize;

/// Runtime state for one connected peer.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    /// Declared role; `None` until the peer registers.
    pub role: Option<PeerRole>,
    /// Room the peer currently occupies a slot in; `None` until registered.
    pub room_code: Option<String>,
    /// Optional human label (e.g. `"lobby-tv"`), supplied at registration.
    pub device_name: Option<String>,
    pub connected_at: Instant,
    /// When the probe sweep last sent this peer a probe.
    pub last_probe_sent: Option<Instant>,
    /// When this peer last answered a probe. Initialized to the connection
    /// time so a peer that never acks anything is evicted one timeout after
    /// connecting rather than immediately.
    pub last_probe_ack: Instant,
}

impl Peer {
    fn new(id: PeerId) -> Self {
        let now = Instant::now();
        Self {
            id,
            role: None,
            room_code: None,
            device_name: None,
            connected_at: now,
            last_probe_sent: None,
            last_probe_ack: now,
        }
    }
}

/// Aggregate connection counters for the snapshot surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionCounters {
    /// Connections accepted since the server started.
    pub total_connections: u64,
    /// Connections currently open.
    pub current: usize,
    /// Currently open connections registered as displays.
    pub displays: usize,
    /// Currently open connections registered as controllers.
    pub controllers: usize,
}

/// In-memory map of all open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: HashMap<PeerId, Peer>,
    total_connections: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly connected peer. Replaces any previous entry for
    /// the same id (last write wins).
    pub fn register(&mut self, id: PeerId) -> &mut Peer {
        self.total_connections += 1;
        self.peers
            .entry(id)
            .and_modify(|p| *p = Peer::new(id))
            .or_insert_with(|| Peer::new(id))
    }

    /// Removes a peer, returning its final state. Returns `None` if the id
    /// was never registered or was already removed — callers use this to
    /// make double-disconnect a no-op.
    pub fn unregister(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn lookup(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn lookup_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Ids of every open connection, for the shutdown pass.
    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    /// Records that a probe was sent to the peer. Unknown ids are ignored.
    pub fn mark_probe_sent(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_probe_sent = Some(Instant::now());
        }
    }

    /// Records a probe acknowledgment from the peer. Unknown ids are ignored.
    pub fn mark_probe_ack(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_probe_ack = Instant::now();
        }
    }

    /// When the peer last answered a probe, for the eviction sweep.
    pub fn last_probe_ack(&self, id: PeerId) -> Option<Instant> {
        self.peers.get(&id).map(|p| p.last_probe_ack)
    }

    /// Current aggregate counters (snapshot surface). Computed fresh on each
    /// call; never mutates state.
    pub fn counters(&self) -> ConnectionCounters {
        let displays = self
            .peers
            .values()
            .filter(|p| p.role == Some(PeerRole::Display))
            .count();
        let controllers = self
            .peers
            .values()
            .filter(|p| p.role == Some(PeerRole::Controller))
            .count();
        ConnectionCounters {
            total_connections: self.total_connections,
            current: self.peers.len(),
            displays,
            controllers,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
