//! # podium-core
//!
//! Shared library for Podium containing the wire protocol message types and
//! the room-code domain logic.
//!
//! Podium pairs two classes of real-time peers — a **display** (the
//! presentation-rendering "TV" endpoint) and a **controller** (the
//! remote-control "mobile" endpoint) — into ephemeral rooms identified by a
//! short human-transcribable code, then relays typed control messages between
//! the two peers in a room.
//!
//! This crate is used by the server and by any native client implementation.
//! It has zero dependencies on sockets, async runtimes, or UI frameworks.
//!
//! - **`protocol`** – The JSON wire protocol: every message is an object with
//!   a `"type"` discriminant field, serialized with serde's internally-tagged
//!   enum representation.
//!
//! - **`domain`** – Pure business logic: generation, normalization, and
//!   format checking of room codes.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `podium_core::ClientMessage` instead of the full module path.
pub use domain::room_code::{
    generate_code, is_acceptable, normalize, CODE_ALPHABET, DEFAULT_CODE_LEN, MAX_CODE_LEN,
    MIN_CODE_LEN,
};
pub use protocol::messages::{
    ClientMessage, DisconnectReason, DocumentKind, ErrorCode, PayloadError, PeerId, PeerRole,
    PresentationAction, RelayEvent, ServerMessage,
};
