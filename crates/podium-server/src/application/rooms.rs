//! Room table: short codes mapped to a display/controller slot pair.
//!
//! A room exists only while at least one slot is occupied (the expiry sweep
//! additionally ages out empty entries that evaded the normal delete path).
//! The table itself is policy-free: collision handling and eviction notices
//! belong to the pairing protocol in `engine`, because they involve sending
//! messages to peers.
//!
//! Like the registry, this is a plain struct — the engine owns the lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use podium_core::{generate_code, PeerId, PeerRole};
use serde::Serialize;

/// A pairing context: one display slot, one controller slot.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub display: Option<PeerId>,
    pub controller: Option<PeerId>,
    pub created_at: Instant,
}

impl Room {
    fn new(code: String) -> Self {
        Self {
            code,
            display: None,
            controller: None,
            created_at: Instant::now(),
        }
    }

    /// The occupant of the slot for `role`, if any.
    pub fn slot(&self, role: PeerRole) -> Option<PeerId> {
        match role {
            PeerRole::Display => self.display,
            PeerRole::Controller => self.controller,
        }
    }

    /// True when both slots are empty — the room is eligible for deletion.
    pub fn is_empty(&self) -> bool {
        self.display.is_none() && self.controller.is_none()
    }

    /// Clears whichever slot holds `peer`. Returns the role of the cleared
    /// slot, or `None` if the peer occupied neither (idempotence).
    pub fn clear_peer(&mut self, peer: PeerId) -> Option<PeerRole> {
        if self.display == Some(peer) {
            self.display = None;
            Some(PeerRole::Display)
        } else if self.controller == Some(peer) {
            self.controller = None;
            Some(PeerRole::Controller)
        } else {
            None
        }
    }
}

/// The three observable states of a slot, as seen by the eviction sweep.
///
/// Modelled as an explicit variant type (rather than a nullable handle plus
/// side lookups) so the sweep's decision logic is an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotView {
    /// No occupant.
    Empty,
    /// Occupant connected and acknowledged a probe within the timeout.
    Live(PeerId),
    /// Occupant overdue for acknowledgment — pending eviction. Also covers
    /// a slot whose occupant has vanished from the registry entirely.
    Stale(PeerId),
}

impl SlotView {
    /// Classifies a slot from its occupant and the occupant's last
    /// acknowledgment time (`None` when the registry has no such peer).
    pub fn classify(
        occupant: Option<PeerId>,
        last_ack: Option<Instant>,
        now: Instant,
        timeout: Duration,
    ) -> SlotView {
        match (occupant, last_ack) {
            (None, _) => SlotView::Empty,
            (Some(peer), None) => SlotView::Stale(peer),
            (Some(peer), Some(ack)) => {
                if now.duration_since(ack) > timeout {
                    SlotView::Stale(peer)
                } else {
                    SlotView::Live(peer)
                }
            }
        }
    }
}

/// Point-in-time description of one room, for the snapshot surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub code: String,
    pub has_display: bool,
    pub has_controller: bool,
    pub age_secs: u64,
}

/// Map of room codes to rooms.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, Room>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `code`, creating an empty one if absent.
    /// `code` must already be normalized.
    pub fn get_or_create(&mut self, code: &str) -> &mut Room {
        self.rooms
            .entry(code.to_string())
            .or_insert_with(|| Room::new(code.to_string()))
    }

    /// Generates a fresh code of `len` characters that names no existing
    /// room. With a 32-character alphabet and ≥4-character codes the
    /// collision space is over a million entries, so the retry loop
    /// terminates almost always on the first draw.
    pub fn generate_unique_code(&self, len: usize) -> String {
        loop {
            let code = generate_code(len);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Deletes a room. Deleting an absent code is a no-op, which keeps the
    /// sweeps' delete paths idempotent.
    pub fn delete(&mut self, code: &str) {
        self.rooms.remove(code);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// All current room codes, for the sweeps to iterate while mutating.
    pub fn codes(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Fresh snapshot of every room. Computed on each call, so it is safe
    /// to enumerate while later mutations occur.
    pub fn list_active(&self) -> Vec<RoomSummary> {
        let now = Instant::now();
        self.rooms
            .values()
            .map(|room| RoomSummary {
                code: room.code.clone(),
                has_display: room.display.is_some(),
                has_controller: room.controller.is_some(),
                age_secs: now.duration_since(room.created_at).as_secs(),
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
