//! Integration tests for the room pairing lifecycle.
//!
//! These tests exercise the application layer of podium-server end-to-end:
//! `RelayEngine` + room table + registry, against the recording transport
//! double. Registration, eviction-by-replacement, presence notifications,
//! and disconnect handling all go through the same public API the WebSocket
//! layer uses.

use std::sync::Arc;

use podium_core::{is_acceptable, ClientMessage, DisconnectReason, ErrorCode, PeerRole, ServerMessage};
use podium_server::application::{PeerTransport, RelayEngine};
use podium_server::domain::ServerConfig;
use podium_server::infrastructure::transport::mock::{RecordingTransport, TransportEvent};
use uuid::Uuid;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn setup() -> (Arc<RelayEngine>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let engine = Arc::new(RelayEngine::new(
        ServerConfig::default(),
        transport.clone() as Arc<dyn PeerTransport>,
    ));
    (engine, transport)
}

/// The room code from a peer's `registered` ack.
fn room_code_of(transport: &RecordingTransport, peer: uuid::Uuid) -> String {
    transport
        .sent_to(peer)
        .iter()
        .find_map(|m| match m {
            ServerMessage::Registered { room_code } => Some(room_code.clone()),
            _ => None,
        })
        .expect("peer must have received a registered ack")
}

async fn register_display(engine: &RelayEngine, code: Option<&str>, name: Option<&str>) -> Uuid {
    let peer = Uuid::new_v4();
    engine.on_connect(peer).await;
    engine
        .handle_message(
            peer,
            ClientMessage::RegisterDisplay {
                room_code: code.map(str::to_string),
                device_name: name.map(str::to_string),
            },
        )
        .await;
    peer
}

async fn register_controller(engine: &RelayEngine, code: &str) -> Uuid {
    let peer = Uuid::new_v4();
    engine.on_connect(peer).await;
    engine
        .handle_message(
            peer,
            ClientMessage::RegisterController {
                room_code: code.to_string(),
            },
        )
        .await;
    peer
}

// ── Registration ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_display_with_no_code_gets_a_generated_acceptable_code() {
    let (engine, transport) = setup();
    let display = register_display(&engine, None, None).await;

    let code = room_code_of(&transport, display);
    assert!(is_acceptable(&code), "generated code {code} must be acceptable");
    assert_eq!(code.len(), ServerConfig::default().code_length);
}

#[tokio::test]
async fn test_requested_code_is_normalized_to_uppercase() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("qmx7p"), None).await;
    assert_eq!(room_code_of(&transport, display), "QMX7P");
}

#[tokio::test]
async fn test_controller_join_is_case_insensitive() {
    let (engine, transport) = setup();
    register_display(&engine, Some("QMX7P"), None).await;

    let controller = register_controller(&engine, "  qmx7p ").await;
    assert_eq!(room_code_of(&transport, controller), "QMX7P");
}

#[tokio::test]
async fn test_controller_join_of_unknown_room_fails_with_missing_room() {
    let (engine, transport) = setup();
    let controller = register_controller(&engine, "ZZZZZ").await;

    let sent = transport.sent_to(controller);
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        sent[0],
        ServerMessage::Error {
            code: ErrorCode::MissingRoom,
            ..
        }
    ));
}

#[tokio::test]
async fn test_controller_join_of_displayless_room_fails_with_no_display() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    let _controller = register_controller(&engine, "QMX7P").await;

    // Display drops; the room lives on with only the controller.
    engine
        .on_disconnect(display, DisconnectReason::TransportClosed)
        .await;

    let late = register_controller(&engine, "QMX7P").await;
    let sent = transport.sent_to(late);
    assert!(matches!(
        sent[0],
        ServerMessage::Error {
            code: ErrorCode::RoomHasNoDisplay,
            ..
        }
    ));
}

// ── Pairing notifications ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pairing_sends_mutual_presence_with_device_names() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), Some("lobby-tv")).await;
    let controller = register_controller(&engine, "QMX7P").await;

    // Controller learns of the display (with its name) right after its ack.
    let to_controller = transport.sent_to(controller);
    assert!(matches!(to_controller[0], ServerMessage::Registered { .. }));
    assert_eq!(
        to_controller[1],
        ServerMessage::PeerConnected {
            role: PeerRole::Display,
            device_name: Some("lobby-tv".to_string()),
        }
    );

    // Display learns of the controller.
    let to_display = transport.sent_to(display);
    assert!(to_display
        .iter()
        .any(|m| matches!(m, ServerMessage::PeerConnected { role: PeerRole::Controller, .. })));
}

#[tokio::test]
async fn test_display_joining_waiting_controller_pairs_both_sides() {
    let (engine, transport) = setup();
    // Controller first is impossible (needs a display), so model the
    // display dropping and returning instead.
    let first = register_display(&engine, Some("QMX7P"), None).await;
    let controller = register_controller(&engine, "QMX7P").await;
    engine
        .on_disconnect(first, DisconnectReason::TransportClosed)
        .await;
    transport.clear();

    let second = register_display(&engine, Some("QMX7P"), Some("backup-tv")).await;

    assert!(transport
        .sent_to(second)
        .iter()
        .any(|m| matches!(m, ServerMessage::PeerConnected { role: PeerRole::Controller, .. })));
    assert_eq!(
        transport.sent_to(controller),
        vec![ServerMessage::PeerConnected {
            role: PeerRole::Display,
            device_name: Some("backup-tv".to_string()),
        }]
    );
}

// ── Slot replacement ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_display_evicts_first_with_notice_before_disconnect() {
    let (engine, transport) = setup();
    let first = register_display(&engine, Some("QMX7P"), None).await;
    transport.clear();

    let second = register_display(&engine, Some("QMX7P"), None).await;

    // The incumbent sees the notice strictly before the forced disconnect.
    let events: Vec<_> = transport
        .events()
        .into_iter()
        .filter(|e| matches!(e, TransportEvent::Sent(p, _) | TransportEvent::Disconnected(p) if *p == first))
        .collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        TransportEvent::Sent(_, ServerMessage::Evicted { .. })
    ));
    assert!(matches!(&events[1], TransportEvent::Disconnected(_)));

    // The replacement owns the slot.
    assert_eq!(room_code_of(&transport, second), "QMX7P");
}

#[tokio::test]
async fn test_display_re_registration_by_same_peer_is_idempotent() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    transport.clear();

    engine
        .handle_message(
            display,
            ClientMessage::RegisterDisplay {
                room_code: Some("QMX7P".to_string()),
                device_name: None,
            },
        )
        .await;

    // Fresh ack, no eviction, no disconnect.
    assert_eq!(room_code_of(&transport, display), "QMX7P");
    assert!(transport.disconnects().is_empty());
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.room_count, 1);
    assert_eq!(snapshot.connections.current, 1);
}

#[tokio::test]
async fn test_second_controller_replaces_first_and_display_is_renotified() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    let first = register_controller(&engine, "QMX7P").await;
    transport.clear();

    let second = register_controller(&engine, "QMX7P").await;

    assert!(transport
        .sent_to(first)
        .iter()
        .any(|m| matches!(m, ServerMessage::Evicted { .. })));
    assert_eq!(transport.disconnects(), vec![first]);
    assert!(matches!(
        transport.sent_to(second)[0],
        ServerMessage::Registered { .. }
    ));
    assert!(transport
        .sent_to(display)
        .iter()
        .any(|m| matches!(m, ServerMessage::PeerConnected { role: PeerRole::Controller, .. })));
}

// ── Disconnect ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_notifies_counterpart_with_role() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    let controller = register_controller(&engine, "QMX7P").await;
    transport.clear();

    engine
        .on_disconnect(controller, DisconnectReason::TransportClosed)
        .await;

    assert_eq!(
        transport.sent_to(display),
        vec![ServerMessage::PeerDisconnected {
            role: PeerRole::Controller,
        }]
    );
}

#[tokio::test]
async fn test_double_disconnect_is_a_no_op() {
    let (engine, transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    let _controller = register_controller(&engine, "QMX7P").await;

    engine
        .on_disconnect(display, DisconnectReason::TransportClosed)
        .await;
    transport.clear();
    engine
        .on_disconnect(display, DisconnectReason::TransportClosed)
        .await;

    assert!(transport.events().is_empty(), "second disconnect must emit nothing");
}

#[tokio::test]
async fn test_last_peer_leaving_deletes_the_room() {
    let (engine, _transport) = setup();
    let display = register_display(&engine, Some("QMX7P"), None).await;
    let controller = register_controller(&engine, "QMX7P").await;

    engine
        .on_disconnect(controller, DisconnectReason::TransportClosed)
        .await;
    assert_eq!(engine.snapshot().await.room_count, 1);

    engine
        .on_disconnect(display, DisconnectReason::TransportClosed)
        .await;
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.room_count, 0);
    assert_eq!(snapshot.connections.current, 0);
}

#[tokio::test]
async fn test_generated_codes_are_distinct_across_rooms() {
    let (engine, transport) = setup();
    let mut codes = std::collections::HashSet::new();
    for _ in 0..20 {
        let display = register_display(&engine, None, None).await;
        codes.insert(room_code_of(&transport, display));
    }
    assert_eq!(codes.len(), 20, "every room must get a unique code");
}
