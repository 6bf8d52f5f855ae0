//! RelayEngine: the single logical owner of the room table and connection
//! registry.
//!
//! Every mutation — registration, relay, disconnection, sweep eviction —
//! executes as a short critical section against one `tokio::sync::Mutex`
//! holding both shared structures, so a registration and an eviction sweep
//! for the same room can never interleave partially. A slot transition
//! (read old occupant, decide, write new occupant) is always one critical
//! section.
//!
//! # No I/O under the lock
//!
//! The engine never awaits transport I/O while the state lock is held.
//! Each operation collects its outbound [`Effect`]s (sends and forced
//! disconnects, in order) under the lock and dispatches them through the
//! [`PeerTransport`] port after releasing it. Ordering within one operation
//! is preserved, which is what guarantees an evicted peer receives its
//! eviction notice *before* the disconnect.
//!
//! # Dependencies point outward
//!
//! The engine depends only on the `PeerTransport` trait; the WebSocket
//! implementation and the recording test double both live in
//! `infrastructure::transport` and are injected at construction time.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use podium_core::{
    is_acceptable, normalize, ClientMessage, DisconnectReason, ErrorCode, PayloadError, PeerId,
    PeerRole, RelayEvent, ServerMessage,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::registry::{ConnectionCounters, ConnectionRegistry};
use crate::application::rooms::{RoomSummary, RoomTable, SlotView};
use crate::domain::ServerConfig;

// ── Outbound port ─────────────────────────────────────────────────────────────

/// Outbound operations the engine invokes on the transport layer.
///
/// `send` is fire-and-forget: there is no delivery confirmation contract
/// beyond the transport's own. Implementations must not block; a message to
/// a vanished peer is silently dropped.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Delivers a message to a peer, best effort.
    async fn send(&self, peer: PeerId, message: &ServerMessage);

    /// Forcibly closes a peer's connection.
    async fn disconnect(&self, peer: PeerId);
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A protocol-rule violation detected while handling one inbound message.
///
/// Violations are fully local: the offending message is dropped, the sender
/// receives one `error` frame carrying the stable [`ErrorCode`], and system
/// state is left unchanged.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("sender role does not permit this message")]
    InvalidRole,

    #[error("no room assigned to this connection")]
    NotInRoom,

    #[error("room {0} does not exist")]
    MissingRoom(String),

    #[error("room {0} has no display")]
    RoomHasNoDisplay(String),

    #[error("no counterpart connected in room {0}")]
    CounterpartNotConnected(String),

    #[error("unknown connection id")]
    UnknownPeer,
}

impl EngineError {
    /// The stable wire code surfaced to the sender.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            EngineError::InvalidRole => ErrorCode::InvalidRole,
            EngineError::NotInRoom | EngineError::MissingRoom(_) => ErrorCode::MissingRoom,
            EngineError::RoomHasNoDisplay(_) => ErrorCode::RoomHasNoDisplay,
            EngineError::CounterpartNotConnected(_) => ErrorCode::CounterpartNotConnected,
            EngineError::UnknownPeer => ErrorCode::RegistrationFailed,
        }
    }
}

// ── Snapshot surface ──────────────────────────────────────────────────────────

/// Point-in-time view of the server, for status endpoints and logs.
/// Computable without mutating state; eventual consistency is acceptable.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    pub room_count: usize,
    pub rooms: Vec<RoomSummary>,
    pub connections: ConnectionCounters,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// An outbound action collected under the state lock and executed after it
/// is released. Order matters: the eviction notice precedes the disconnect.
enum Effect {
    Send(PeerId, ServerMessage),
    Disconnect(PeerId),
}

/// Both shared structures live behind one mutex. See the module docs.
struct EngineState {
    registry: ConnectionRegistry,
    rooms: RoomTable,
}

/// The room pairing and message relay engine.
pub struct RelayEngine {
    config: ServerConfig,
    transport: Arc<dyn PeerTransport>,
    state: Mutex<EngineState>,
}

impl RelayEngine {
    pub fn new(config: ServerConfig, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            config,
            transport,
            state: Mutex::new(EngineState {
                registry: ConnectionRegistry::new(),
                rooms: RoomTable::new(),
            }),
        }
    }

    // ── Inbound operations (transport-facing) ─────────────────────────────────

    /// A transport connection opened. The peer is tracked from this moment,
    /// but occupies no room slot until it registers.
    pub async fn on_connect(&self, peer: PeerId) {
        let mut state = self.state.lock().await;
        state.registry.register(peer);
        debug!(peer = %peer, current = state.registry.counters().current, "peer connected");
    }

    /// A transport connection closed. Idempotent: the transport may fire
    /// this twice (or after a sweep already evicted the peer) and the second
    /// call is a no-op — no duplicate notifications, no error.
    pub async fn on_disconnect(&self, peer: PeerId, reason: DisconnectReason) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().await;
            let Some(removed) = state.registry.unregister(peer) else {
                return;
            };
            info!(peer = %peer, reason = ?reason, "peer disconnected");
            if let Some(code) = removed.room_code {
                clear_room_slot(&mut state, &code, peer, &mut effects);
            }
        }
        self.dispatch(effects).await;
    }

    /// Handles one inbound message from a connected peer. Rule violations
    /// are answered with an `error` frame; they never tear the session down.
    pub async fn handle_message(&self, peer: PeerId, message: ClientMessage) {
        debug!(peer = %peer, kind = message.kind_name(), "inbound message");

        let mut effects = Vec::new();
        let result = {
            let mut state = self.state.lock().await;
            match message {
                ClientMessage::RegisterDisplay {
                    room_code,
                    device_name,
                } => self.register_display(&mut state, peer, room_code, device_name, &mut effects),
                ClientMessage::RegisterController { room_code } => {
                    self.register_controller(&mut state, peer, &room_code, &mut effects)
                }
                ClientMessage::ProbeAck => {
                    state.registry.mark_probe_ack(peer);
                    Ok(())
                }
                relayable => match relayable.into_relay_event() {
                    Some(event) => self.relay(&mut state, peer, event, &mut effects),
                    None => Ok(()),
                },
            }
        };

        if let Err(e) = result {
            warn!(peer = %peer, code = %e.code(), "message rejected: {e}");
            effects.push(Effect::Send(
                peer,
                ServerMessage::Error {
                    code: e.code(),
                    message: e.to_string(),
                },
            ));
        }
        self.dispatch(effects).await;
    }

    /// Point-in-time snapshot for the status surface.
    pub async fn snapshot(&self) -> ServerSnapshot {
        let state = self.state.lock().await;
        ServerSnapshot {
            room_count: state.rooms.len(),
            rooms: state.rooms.list_active(),
            connections: state.registry.counters(),
        }
    }

    // ── Pairing protocol ──────────────────────────────────────────────────────

    /// Installs `peer` as the display of the resolved room.
    ///
    /// Room resolution: an acceptable requested code is honored (claiming or
    /// creating that room); anything else gets a freshly generated unique
    /// code. Re-registration by the same connection id is an idempotent
    /// refresh; a different live incumbent is evicted first — notice, then
    /// disconnect ("last writer wins" for the display slot).
    fn register_display(
        &self,
        state: &mut EngineState,
        peer_id: PeerId,
        requested: Option<String>,
        device_name: Option<String>,
        effects: &mut Vec<Effect>,
    ) -> Result<(), EngineError> {
        if !state.registry.contains(peer_id) {
            return Err(EngineError::UnknownPeer);
        }

        let code = match requested.as_deref() {
            Some(c) if is_acceptable(c) => normalize(c),
            _ => state.rooms.generate_unique_code(self.config.code_length),
        };

        // A peer re-registering into a different room (or a different slot)
        // vacates its old slot first, notifying whoever it leaves behind.
        self.detach_if_moving(state, peer_id, &code, PeerRole::Display, effects);

        if let Some(incumbent) = state.rooms.get(&code).and_then(|r| r.display) {
            if incumbent != peer_id && state.registry.contains(incumbent) {
                debug!(room = %code, old = %incumbent, new = %peer_id, "display slot replaced");
                evict_peer(
                    state,
                    incumbent,
                    DisconnectReason::RegistrationReplaced,
                    "display slot claimed by another device",
                    effects,
                );
            }
        }

        let room = state.rooms.get_or_create(&code);
        room.display = Some(peer_id);
        let controller = room.controller;

        if let Some(peer) = state.registry.lookup_mut(peer_id) {
            peer.role = Some(PeerRole::Display);
            peer.room_code = Some(code.clone());
            peer.device_name = device_name.clone();
        }

        info!(room = %code, peer = %peer_id, "display registered");
        effects.push(Effect::Send(
            peer_id,
            ServerMessage::Registered {
                room_code: code.clone(),
            },
        ));

        // Already paired: both sides learn of each other's presence.
        if let Some(ctrl) = controller.filter(|c| state.registry.contains(*c)) {
            let ctrl_name = state.registry.lookup(ctrl).and_then(|p| p.device_name.clone());
            effects.push(Effect::Send(
                peer_id,
                ServerMessage::PeerConnected {
                    role: PeerRole::Controller,
                    device_name: ctrl_name,
                },
            ));
            effects.push(Effect::Send(
                ctrl,
                ServerMessage::PeerConnected {
                    role: PeerRole::Display,
                    device_name,
                },
            ));
        }
        Ok(())
    }

    /// Installs `peer` as the controller of an existing room.
    ///
    /// Controllers may only join rooms with a live display; all validation
    /// happens before any mutation so a rejected join leaves the room
    /// untouched.
    fn register_controller(
        &self,
        state: &mut EngineState,
        peer_id: PeerId,
        requested: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<(), EngineError> {
        if !state.registry.contains(peer_id) {
            return Err(EngineError::UnknownPeer);
        }

        let code = normalize(requested);
        let room = state
            .rooms
            .get(&code)
            .ok_or_else(|| EngineError::MissingRoom(code.clone()))?;
        let display = room
            .display
            .filter(|d| *d != peer_id && state.registry.contains(*d))
            .ok_or_else(|| EngineError::RoomHasNoDisplay(code.clone()))?;
        let incumbent = room.controller;

        self.detach_if_moving(state, peer_id, &code, PeerRole::Controller, effects);

        if let Some(incumbent) = incumbent {
            if incumbent != peer_id && state.registry.contains(incumbent) {
                debug!(room = %code, old = %incumbent, new = %peer_id, "controller slot replaced");
                evict_peer(
                    state,
                    incumbent,
                    DisconnectReason::RegistrationReplaced,
                    "controller slot claimed by another device",
                    effects,
                );
            }
        }

        state.rooms.get_or_create(&code).controller = Some(peer_id);

        if let Some(peer) = state.registry.lookup_mut(peer_id) {
            peer.role = Some(PeerRole::Controller);
            peer.room_code = Some(code.clone());
        }

        info!(room = %code, peer = %peer_id, "controller registered; room paired");
        let display_name = state
            .registry
            .lookup(display)
            .and_then(|p| p.device_name.clone());
        let my_name = state
            .registry
            .lookup(peer_id)
            .and_then(|p| p.device_name.clone());

        effects.push(Effect::Send(
            peer_id,
            ServerMessage::Registered {
                room_code: code.clone(),
            },
        ));
        effects.push(Effect::Send(
            peer_id,
            ServerMessage::PeerConnected {
                role: PeerRole::Display,
                device_name: display_name,
            },
        ));
        effects.push(Effect::Send(
            display,
            ServerMessage::PeerConnected {
                role: PeerRole::Controller,
                device_name: my_name,
            },
        ));
        Ok(())
    }

    /// Vacates the peer's current slot unless it already occupies exactly
    /// the slot it is registering into (same room, same role — the
    /// idempotent-refresh case).
    fn detach_if_moving(
        &self,
        state: &mut EngineState,
        peer_id: PeerId,
        new_code: &str,
        new_role: PeerRole,
        effects: &mut Vec<Effect>,
    ) {
        let (prior_code, prior_role) = match state.registry.lookup(peer_id) {
            Some(p) => (p.room_code.clone(), p.role),
            None => (None, None),
        };
        if let Some(prior) = prior_code {
            if prior != new_code || prior_role != Some(new_role) {
                clear_room_slot(state, &prior, peer_id, effects);
            }
        }
    }

    // ── Relay / authorization ─────────────────────────────────────────────────

    /// Authorizes and forwards one relay event.
    ///
    /// Checks, in order: payload validity, role direction, room membership
    /// and existence, counterpart occupancy and liveness. The forwarded copy
    /// is re-stamped with the server wall clock and the sender's identity;
    /// the client-supplied timestamp was already discarded during decode.
    fn relay(
        &self,
        state: &mut EngineState,
        sender_id: PeerId,
        event: RelayEvent,
        effects: &mut Vec<Effect>,
    ) -> Result<(), EngineError> {
        let sender = state
            .registry
            .lookup(sender_id)
            .ok_or(EngineError::UnknownPeer)?;

        event.validate()?;

        let sender_role = sender.role;
        if event.requires_controller() && sender_role != Some(PeerRole::Controller) {
            return Err(EngineError::InvalidRole);
        }

        let code = sender.room_code.clone().ok_or(EngineError::NotInRoom)?;
        let sender_role = sender_role.ok_or(EngineError::InvalidRole)?;

        let room = state
            .rooms
            .get(&code)
            .ok_or_else(|| EngineError::MissingRoom(code.clone()))?;
        let target = room
            .slot(sender_role.counterpart())
            .filter(|t| state.registry.contains(*t))
            .ok_or_else(|| EngineError::CounterpartNotConnected(code.clone()))?;

        debug!(room = %code, kind = event.kind_name(), from = %sender_id, to = %target, "relaying event");
        effects.push(Effect::Send(
            target,
            ServerMessage::Event {
                sender: sender_id,
                sender_role,
                timestamp_ms: now_ms(),
                event,
            },
        ));
        Ok(())
    }

    // ── Liveness sweeps ───────────────────────────────────────────────────────

    /// Sends a probe to every occupied slot in every room and records the
    /// send time. Does not wait for acknowledgments — the eviction sweep
    /// reconciles on its own schedule.
    pub async fn probe_sweep(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().await;
            for code in state.rooms.codes() {
                let occupants: Vec<PeerId> = match state.rooms.get(&code) {
                    Some(room) => room.display.into_iter().chain(room.controller).collect(),
                    None => continue,
                };
                for peer in occupants {
                    if state.registry.contains(peer) {
                        state.registry.mark_probe_sent(peer);
                        effects.push(Effect::Send(peer, ServerMessage::Probe));
                    }
                }
            }
        }
        debug!(probes = effects.len(), "probe sweep");
        self.dispatch(effects).await;
    }

    /// Force-disconnects every peer whose last probe acknowledgment is older
    /// than the eviction timeout, empties its slot, notifies the
    /// counterpart, and deletes rooms left fully empty.
    ///
    /// Each slot is handled independently, so one room's state can never
    /// stall eviction for the rest; deletions are idempotent.
    pub async fn eviction_sweep(&self) {
        let timeout = self.config.eviction_timeout;
        let mut effects = Vec::new();
        let mut evicted = 0usize;
        {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            for code in state.rooms.codes() {
                for role in [PeerRole::Display, PeerRole::Controller] {
                    let occupant = state.rooms.get(&code).and_then(|r| r.slot(role));
                    let last_ack = occupant.and_then(|p| state.registry.last_probe_ack(p));
                    match SlotView::classify(occupant, last_ack, now, timeout) {
                        SlotView::Empty | SlotView::Live(_) => {}
                        SlotView::Stale(peer) => {
                            warn!(room = %code, role = %role, peer = %peer, "stale slot");
                            evict_peer(
                                &mut state,
                                peer,
                                DisconnectReason::LivenessTimeout,
                                "liveness timeout",
                                &mut effects,
                            );
                            clear_room_slot(&mut state, &code, peer, &mut effects);
                            evicted += 1;
                        }
                    }
                }
            }
        }
        if evicted > 0 {
            info!(evicted, "eviction sweep complete");
        }
        self.dispatch(effects).await;
    }

    /// Deletes rooms whose slots are both empty and whose age exceeds the
    /// maximum lifetime. Catches orphaned entries (created but never
    /// paired) that evaded the eviction sweep's delete path.
    pub async fn expiry_sweep(&self) {
        let max_age = self.config.room_max_age;
        let mut expired = 0usize;
        let (rooms, connections) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            for code in state.rooms.codes() {
                let is_expired = state
                    .rooms
                    .get(&code)
                    .map(|r| r.is_empty() && now.duration_since(r.created_at) > max_age)
                    .unwrap_or(false);
                if is_expired {
                    state.rooms.delete(&code);
                    expired += 1;
                }
            }
            (state.rooms.len(), state.registry.counters())
        };
        info!(
            rooms,
            connections = connections.current,
            expired,
            "expiry sweep"
        );
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Orderly shutdown: every connected peer gets an eviction notice and a
    /// forced disconnect, then all state is dropped. Called once after the
    /// accept loop has stopped, so no new connections can race this.
    pub async fn shutdown(&self) {
        let mut effects = Vec::new();
        let notified;
        {
            let mut state = self.state.lock().await;
            let ids = state.registry.ids();
            notified = ids.len();
            for peer in ids {
                evict_peer(
                    &mut state,
                    peer,
                    DisconnectReason::ServerShutdown,
                    "server shutting down",
                    &mut effects,
                );
            }
            for code in state.rooms.codes() {
                state.rooms.delete(&code);
            }
        }
        info!(notified, "shutdown complete");
        self.dispatch(effects).await;
    }

    // ── Effect dispatch ───────────────────────────────────────────────────────

    /// Executes collected effects in order, after the state lock is gone.
    async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(peer, message) => self.transport.send(peer, &message).await,
                Effect::Disconnect(peer) => self.transport.disconnect(peer).await,
            }
        }
    }
}

// ── Shared removal primitives ─────────────────────────────────────────────────

/// Removes `peer` from whichever slot of `room_code` it occupies, notifies
/// the counterpart, and deletes the room if both slots are now empty.
///
/// This is the single primitive behind transport disconnects, sweep
/// evictions, and slot moves — sharing it is what makes double-disconnect
/// observably idempotent. Calling it for an absent room or a peer that
/// occupies no slot is a no-op.
fn clear_room_slot(
    state: &mut EngineState,
    room_code: &str,
    peer: PeerId,
    effects: &mut Vec<Effect>,
) {
    let (cleared_role, counterpart, now_empty) = match state.rooms.get_mut(room_code) {
        Some(room) => match room.clear_peer(peer) {
            Some(role) => (role, room.slot(role.counterpart()), room.is_empty()),
            None => return,
        },
        None => return,
    };

    if now_empty {
        debug!(room = %room_code, "room empty; deleting");
        state.rooms.delete(room_code);
    }

    if let Some(cp) = counterpart {
        if state.registry.contains(cp) {
            effects.push(Effect::Send(
                cp,
                ServerMessage::PeerDisconnected { role: cleared_role },
            ));
        }
    }
}

/// Sends an eviction notice, queues the forced disconnect (in that order, so
/// the evicted peer can observe why it was dropped), and removes the peer
/// from the registry so the transport's eventual disconnect callback becomes
/// a no-op.
fn evict_peer(
    state: &mut EngineState,
    peer: PeerId,
    reason: DisconnectReason,
    notice: &str,
    effects: &mut Vec<Effect>,
) {
    info!(peer = %peer, reason = ?reason, "evicting peer");
    effects.push(Effect::Send(
        peer,
        ServerMessage::Evicted {
            reason: notice.to_string(),
        },
    ));
    effects.push(Effect::Disconnect(peer));
    state.registry.unregister(peer);
}

/// Server wall-clock milliseconds since the Unix epoch, for re-stamping
/// forwarded events.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
