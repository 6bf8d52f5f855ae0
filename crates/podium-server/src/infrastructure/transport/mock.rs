//! Recording transport double for engine-level tests.
//!
//! Captures every outbound action in one ordered log, so tests can assert
//! not only *what* a peer received but the relative order of sends and
//! forced disconnects (the eviction-notice-before-disconnect contract).

use std::sync::Mutex;

use async_trait::async_trait;
use podium_core::{PeerId, ServerMessage};

use crate::application::PeerTransport;

/// One recorded outbound action, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Sent(PeerId, ServerMessage),
    Disconnected(PeerId),
}

/// In-memory [`PeerTransport`] that records instead of delivering.
#[derive(Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<TransportEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full ordered action log.
    pub fn events(&self) -> Vec<TransportEvent> {
        self.log.lock().unwrap().clone()
    }

    /// Messages sent to one peer, in order.
    pub fn sent_to(&self, peer: PeerId) -> Vec<ServerMessage> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Sent(p, m) if *p == peer => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Peers that received a forced disconnect, in order.
    pub fn disconnects(&self) -> Vec<PeerId> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Disconnected(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Discards everything recorded so far. Useful between test phases.
    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl PeerTransport for RecordingTransport {
    async fn send(&self, peer: PeerId, message: &ServerMessage) {
        self.log
            .lock()
            .unwrap()
            .push(TransportEvent::Sent(peer, message.clone()));
    }

    async fn disconnect(&self, peer: PeerId) {
        self.log
            .lock()
            .unwrap()
            .push(TransportEvent::Disconnected(peer));
    }
}
