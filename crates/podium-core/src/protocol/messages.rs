//! All Podium protocol message types.
//!
//! The protocol has two directions with distinct message catalogs:
//!
//! - [`ClientMessage`] – everything a connected peer may send to the server
//!   (registration, liveness acknowledgments, and the relayable events).
//! - [`ServerMessage`] – everything the server may send to a peer
//!   (acknowledgments, presence notices, liveness probes, forwarded events,
//!   and error signals).
//!
//! Using two distinct enums makes it a compile-time error to accidentally
//! send a server-only message from a client, and vice versa.
//!
//! # Timestamps
//!
//! Relayable client messages may carry an optional `timestamp_ms`. The server
//! never trusts it for ordering: every forwarded event is re-stamped with a
//! server-assigned wall-clock timestamp and the sender's connection identity
//! inside the [`ServerMessage::Event`] envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque connection identifier assigned by the server when a peer connects.
pub type PeerId = Uuid;

// ── Roles ─────────────────────────────────────────────────────────────────────

/// Role a peer declares at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// The presentation-rendering endpoint (the "TV").
    Display,
    /// The remote-control endpoint (the "mobile").
    Controller,
}

impl PeerRole {
    /// Returns the role occupying the other slot of a room.
    pub fn counterpart(self) -> PeerRole {
        match self {
            PeerRole::Display => PeerRole::Controller,
            PeerRole::Controller => PeerRole::Display,
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Display => write!(f, "display"),
            PeerRole::Controller => write!(f, "controller"),
        }
    }
}

// ── Relayable event payloads ──────────────────────────────────────────────────

/// Presentation control action, drawn from a fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationAction {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Fullscreen,
    ExitFullscreen,
}

/// Kind of document a display is asked to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Slideshow,
    Image,
    Video,
}

/// One relayable event, as forwarded between the peers of a room.
///
/// All variants except [`RelayEvent::Custom`] flow controller → display only.
/// `Custom` is the bidirectional extension channel: an opaque event-type tag
/// plus an arbitrary JSON payload, so clients can add behaviour without a
/// protocol change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Jump to a slide by zero-based index.
    SlideChange { slide: u32 },
    /// Scroll the current document to an absolute offset, optionally
    /// pinning a page number.
    DocumentScroll {
        offset: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
    },
    /// Jump to a page by one-based number.
    PageChange { page: u32 },
    /// Trigger a presentation control action.
    PresentationAction { action: PresentationAction },
    /// Ask the display to load a document from a source locator.
    DocumentLoad {
        kind: DocumentKind,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, String>>,
    },
    /// Opaque extension event; forwarded to whichever peer occupies the
    /// counterpart slot.
    Custom {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// A relay payload that failed type/range/enum validation.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("page number must be >= 1")]
    PageOutOfRange,
    #[error("scroll offset must be a finite number")]
    NonFiniteOffset,
    #[error("document source must not be empty")]
    EmptySource,
    #[error("custom event type must not be empty")]
    EmptyEventType,
}

impl RelayEvent {
    /// Validates the range/content rules that the JSON types alone cannot
    /// express. Enum-valued fields (actions, document kinds) are already
    /// enforced by serde at deserialization time.
    pub fn validate(&self) -> Result<(), PayloadError> {
        match self {
            RelayEvent::SlideChange { .. } => Ok(()),
            RelayEvent::DocumentScroll { offset, .. } => {
                if offset.is_finite() {
                    Ok(())
                } else {
                    Err(PayloadError::NonFiniteOffset)
                }
            }
            RelayEvent::PageChange { page } => {
                if *page >= 1 {
                    Ok(())
                } else {
                    Err(PayloadError::PageOutOfRange)
                }
            }
            RelayEvent::PresentationAction { .. } => Ok(()),
            RelayEvent::DocumentLoad { source, .. } => {
                if source.trim().is_empty() {
                    Err(PayloadError::EmptySource)
                } else {
                    Ok(())
                }
            }
            RelayEvent::Custom { event, .. } => {
                if event.trim().is_empty() {
                    Err(PayloadError::EmptyEventType)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Whether this event may only be sent by the controller.
    ///
    /// All typed presentation events are controller → display; only the
    /// custom channel is bidirectional.
    pub fn requires_controller(&self) -> bool {
        !matches!(self, RelayEvent::Custom { .. })
    }

    /// Short variant name for log messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RelayEvent::SlideChange { .. } => "slide_change",
            RelayEvent::DocumentScroll { .. } => "document_scroll",
            RelayEvent::PageChange { .. } => "page_change",
            RelayEvent::PresentationAction { .. } => "presentation_action",
            RelayEvent::DocumentLoad { .. } => "document_load",
            RelayEvent::Custom { .. } => "custom_event",
        }
    }
}

// ── Client → server messages ──────────────────────────────────────────────────

/// All messages a peer can send to the server.
///
/// # Serde representation
///
/// ```json
/// {"type":"register_display","room_code":"QMX7P","device_name":"lobby-tv"}
/// {"type":"register_controller","room_code":"qmx7p"}
/// {"type":"probe_ack"}
/// {"type":"slide_change","slide":4,"timestamp_ms":1724900000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim (or create) a room's display slot.
    ///
    /// With `room_code` absent — or failing the format check — the server
    /// generates a fresh code and returns it in the `registered` ack.
    RegisterDisplay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_code: Option<String>,
        /// Human label shown to the counterpart (e.g. `"lobby-tv"`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_name: Option<String>,
    },

    /// Join an existing room's controller slot. The room must exist and its
    /// display slot must be occupied.
    RegisterController { room_code: String },

    /// Answer to a server liveness [`ServerMessage::Probe`].
    ProbeAck,

    /// Controller → display: jump to a slide by zero-based index.
    SlideChange {
        slide: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },

    /// Controller → display: scroll to an absolute document offset.
    DocumentScroll {
        offset: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },

    /// Controller → display: jump to a page by one-based number.
    PageChange {
        page: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },

    /// Controller → display: trigger a presentation action.
    PresentationAction {
        action: PresentationAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },

    /// Controller → display: load a document.
    DocumentLoad {
        kind: DocumentKind,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },

    /// Either role → counterpart: opaque extension event.
    CustomEvent {
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<u64>,
    },
}

impl ClientMessage {
    /// Extracts the relayable event from this message, discarding the
    /// client-supplied timestamp (it is never trusted for ordering).
    ///
    /// Returns `None` for registration and liveness messages, which are
    /// handled by the pairing protocol rather than the relay engine.
    pub fn into_relay_event(self) -> Option<RelayEvent> {
        match self {
            ClientMessage::RegisterDisplay { .. }
            | ClientMessage::RegisterController { .. }
            | ClientMessage::ProbeAck => None,
            ClientMessage::SlideChange { slide, .. } => Some(RelayEvent::SlideChange { slide }),
            ClientMessage::DocumentScroll { offset, page, .. } => {
                Some(RelayEvent::DocumentScroll { offset, page })
            }
            ClientMessage::PageChange { page, .. } => Some(RelayEvent::PageChange { page }),
            ClientMessage::PresentationAction { action, .. } => {
                Some(RelayEvent::PresentationAction { action })
            }
            ClientMessage::DocumentLoad {
                kind,
                source,
                metadata,
                ..
            } => Some(RelayEvent::DocumentLoad {
                kind,
                source,
                metadata,
            }),
            ClientMessage::CustomEvent { event, payload, .. } => {
                Some(RelayEvent::Custom { event, payload })
            }
        }
    }

    /// Short variant name for log messages. Never includes field values, so
    /// opaque custom payloads cannot leak into logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ClientMessage::RegisterDisplay { .. } => "register_display",
            ClientMessage::RegisterController { .. } => "register_controller",
            ClientMessage::ProbeAck => "probe_ack",
            ClientMessage::SlideChange { .. } => "slide_change",
            ClientMessage::DocumentScroll { .. } => "document_scroll",
            ClientMessage::PageChange { .. } => "page_change",
            ClientMessage::PresentationAction { .. } => "presentation_action",
            ClientMessage::DocumentLoad { .. } => "document_load",
            ClientMessage::CustomEvent { .. } => "custom_event",
        }
    }
}

// ── Server → client messages ──────────────────────────────────────────────────

/// Stable error codes surfaced to the offending sender.
///
/// A rejected message is dropped — never queued or retried — and the sender
/// receives exactly one [`ServerMessage::Error`] carrying one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The sender's declared role does not permit the operation.
    InvalidRole,
    /// The referenced room code does not exist.
    MissingRoom,
    /// A controller attempted to join a room with no live display.
    RoomHasNoDisplay,
    /// The relay target slot is empty or its occupant is not connected.
    CounterpartNotConnected,
    /// The message failed type/range/enum validation for its kind.
    InvalidPayload,
    /// Unexpected internal fault during slot assignment (catch-all).
    RegistrationFailed,
}

impl ErrorCode {
    /// The stable wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRole => "invalid_role",
            ErrorCode::MissingRoom => "missing_room",
            ErrorCode::RoomHasNoDisplay => "room_has_no_display",
            ErrorCode::CounterpartNotConnected => "counterpart_not_connected",
            ErrorCode::InvalidPayload => "invalid_payload",
            ErrorCode::RegistrationFailed => "registration_failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the server force-closed a connection. Informational only; used for
/// logging and for the counterpart's disconnect notice context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// A new peer claimed the slot this peer occupied.
    RegistrationReplaced,
    /// The peer failed to acknowledge liveness probes in time.
    LivenessTimeout,
    /// The server is shutting down.
    ServerShutdown,
    /// The transport reported the connection closed.
    TransportClosed,
}

/// All messages the server can send to a peer.
///
/// # Serde representation
///
/// ```json
/// {"type":"registered","room_code":"QMX7P"}
/// {"type":"peer_connected","role":"controller"}
/// {"type":"probe"}
/// {"type":"event","sender":"…uuid…","sender_role":"controller",
///  "timestamp_ms":1724900000123,"event":{"type":"slide_change","slide":4}}
/// {"type":"error","code":"missing_room","message":"no room QMX7P"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration acknowledgment carrying the resolved room code.
    Registered { room_code: String },

    /// The counterpart slot of the sender's room was just filled.
    PeerConnected {
        role: PeerRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_name: Option<String>,
    },

    /// The counterpart slot of the sender's room was just emptied.
    PeerDisconnected { role: PeerRole },

    /// This peer is about to be force-disconnected; sent *before* the
    /// disconnect so the evicted peer can observe why it was dropped.
    Evicted { reason: String },

    /// Liveness probe; the peer must answer with `probe_ack`.
    Probe,

    /// A forwarded relay event, re-stamped by the server.
    Event {
        /// Connection id of the originating peer.
        sender: PeerId,
        /// Role of the originating peer.
        sender_role: PeerRole,
        /// Server wall-clock milliseconds since the Unix epoch, assigned at
        /// forward time. The original client timestamp is discarded.
        timestamp_ms: u64,
        event: RelayEvent,
    },

    /// Rejection signal for a message that violated a protocol rule.
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Short variant name for log messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ServerMessage::Registered { .. } => "registered",
            ServerMessage::PeerConnected { .. } => "peer_connected",
            ServerMessage::PeerDisconnected { .. } => "peer_disconnected",
            ServerMessage::Evicted { .. } => "evicted",
            ServerMessage::Probe => "probe",
            ServerMessage::Event { .. } => "event",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterpart_is_symmetric() {
        assert_eq!(PeerRole::Display.counterpart(), PeerRole::Controller);
        assert_eq!(PeerRole::Controller.counterpart(), PeerRole::Display);
    }

    #[test]
    fn test_client_message_json_uses_type_tag() {
        let msg = ClientMessage::SlideChange {
            slide: 4,
            timestamp_ms: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"slide_change","slide":4}"#);
    }

    #[test]
    fn test_register_display_omits_absent_optionals() {
        let msg = ClientMessage::RegisterDisplay {
            room_code: None,
            device_name: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"register_display"}"#);
    }

    #[test]
    fn test_probe_ack_round_trips_as_bare_object() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"probe_ack"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::ProbeAck);
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_action_outside_fixed_set_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(
            r#"{"type":"presentation_action","action":"self_destruct"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_into_relay_event_strips_client_timestamp() {
        let msg = ClientMessage::PageChange {
            page: 7,
            timestamp_ms: Some(123),
        };
        assert_eq!(
            msg.into_relay_event(),
            Some(RelayEvent::PageChange { page: 7 })
        );
    }

    #[test]
    fn test_into_relay_event_is_none_for_registration() {
        let msg = ClientMessage::RegisterController {
            room_code: "QMX7P".into(),
        };
        assert_eq!(msg.into_relay_event(), None);
    }

    #[test]
    fn test_validate_rejects_page_zero() {
        let event = RelayEvent::PageChange { page: 0 };
        assert_eq!(event.validate(), Err(PayloadError::PageOutOfRange));
    }

    #[test]
    fn test_validate_rejects_non_finite_offset() {
        let event = RelayEvent::DocumentScroll {
            offset: f64::NAN,
            page: None,
        };
        assert_eq!(event.validate(), Err(PayloadError::NonFiniteOffset));
    }

    #[test]
    fn test_validate_rejects_empty_document_source() {
        let event = RelayEvent::DocumentLoad {
            kind: DocumentKind::Pdf,
            source: "   ".into(),
            metadata: None,
        };
        assert_eq!(event.validate(), Err(PayloadError::EmptySource));
    }

    #[test]
    fn test_validate_accepts_slide_zero() {
        // Slide indices are zero-based; index 0 is the first slide.
        assert_eq!(RelayEvent::SlideChange { slide: 0 }.validate(), Ok(()));
    }

    #[test]
    fn test_typed_events_require_controller_but_custom_does_not() {
        assert!(RelayEvent::SlideChange { slide: 1 }.requires_controller());
        assert!(RelayEvent::PresentationAction {
            action: PresentationAction::Play
        }
        .requires_controller());
        assert!(!RelayEvent::Custom {
            event: "laser_pointer".into(),
            payload: serde_json::Value::Null,
        }
        .requires_controller());
    }

    #[test]
    fn test_event_envelope_nests_inner_event_object() {
        let msg = ServerMessage::Event {
            sender: Uuid::nil(),
            sender_role: PeerRole::Controller,
            timestamp_ms: 42,
            event: RelayEvent::SlideChange { slide: 4 },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"]["type"], "slide_change");
        assert_eq!(json["event"]["slide"], 4);
        assert_eq!(json["timestamp_ms"], 42);
    }

    #[test]
    fn test_error_code_wire_strings_are_stable() {
        assert_eq!(ErrorCode::InvalidRole.as_str(), "invalid_role");
        assert_eq!(ErrorCode::MissingRoom.as_str(), "missing_room");
        assert_eq!(ErrorCode::RoomHasNoDisplay.as_str(), "room_has_no_display");
        assert_eq!(
            ErrorCode::CounterpartNotConnected.as_str(),
            "counterpart_not_connected"
        );
        assert_eq!(ErrorCode::InvalidPayload.as_str(), "invalid_payload");
        assert_eq!(ErrorCode::RegistrationFailed.as_str(), "registration_failed");
    }

    #[test]
    fn test_kind_name_never_exposes_payload_values() {
        let msg = ClientMessage::CustomEvent {
            event: "secret-token".into(),
            payload: serde_json::json!({"token": "hunter2"}),
            timestamp_ms: None,
        };
        let name = msg.kind_name();
        assert_eq!(name, "custom_event");
        assert!(!name.contains("hunter2"));
    }
}
