//! Outbound delivery lanes between the engine and the per-session tasks.
//!
//! Each WebSocket session registers an unbounded mpsc lane here when it
//! opens. The engine's [`PeerTransport`] calls resolve a peer id to its lane
//! and enqueue; the session's pump loop drains the lane into the socket.
//! This indirection is what lets the engine stay free of socket types and
//! lets a send to a vanished peer degrade to a silent drop instead of an
//! error path.

pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use podium_core::{PeerId, ServerMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// One item on a session's outbound lane.
#[derive(Debug)]
pub enum Outbound {
    /// A serialized protocol frame to write as a WebSocket text message.
    Frame(String),
    /// Instruction to close the socket and end the session.
    Close,
}

/// WebSocket-backed [`PeerTransport`](crate::application::PeerTransport):
/// a map from peer id to that session's outbound lane.
#[derive(Default)]
pub struct ChannelTransport {
    lanes: RwLock<HashMap<PeerId, UnboundedSender<Outbound>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers the outbound lane for a new session. The
    /// returned receiver is drained by the session's pump loop.
    pub async fn attach(&self, peer: PeerId) -> UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lanes.write().await.insert(peer, tx);
        rx
    }

    /// Removes a session's lane. Idempotent; called from session teardown.
    pub async fn detach(&self, peer: PeerId) {
        self.lanes.write().await.remove(&peer);
    }
}

#[async_trait]
impl crate::application::PeerTransport for ChannelTransport {
    async fn send(&self, peer: PeerId, message: &ServerMessage) {
        let frame = match serde_json::to_string(message) {
            Ok(f) => f,
            Err(e) => {
                // Serialization of our own types cannot realistically fail;
                // if it does, dropping the frame is the least bad option.
                error!(peer = %peer, "failed to serialize outbound frame: {e}");
                return;
            }
        };
        let lanes = self.lanes.read().await;
        match lanes.get(&peer) {
            Some(lane) => {
                if lane.send(Outbound::Frame(frame)).is_err() {
                    debug!(peer = %peer, "outbound lane closed; frame dropped");
                }
            }
            None => {
                debug!(peer = %peer, kind = message.kind_name(), "no lane for peer; frame dropped");
            }
        }
    }

    async fn disconnect(&self, peer: PeerId) {
        let lanes = self.lanes.read().await;
        if let Some(lane) = lanes.get(&peer) {
            let _ = lane.send(Outbound::Close);
        }
    }
}
