//! The Podium wire protocol.
//!
//! All traffic is JSON text frames. Each frame is one message object with a
//! `"type"` field naming the variant; all other fields are flattened into the
//! same object. For example:
//!
//! ```json
//! {"type":"slide_change","slide":4}
//! {"type":"register_display","room_code":"QMX7P","device_name":"lobby-tv"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles the discriminant
//! automatically in both directions.

pub mod messages;

pub use messages::{
    ClientMessage, DisconnectReason, DocumentKind, ErrorCode, PayloadError, PeerId, PeerRole,
    PresentationAction, RelayEvent, ServerMessage,
};
