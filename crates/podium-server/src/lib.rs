//! podium-server library crate.
//!
//! Pairs display and controller peers into short-code rooms and relays typed
//! control messages between them.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Peers (JSON over WebSocket)
//!         ↕
//! [podium-server]
//!   ├── domain/           Pure types: ServerConfig
//!   ├── application/      Core engine: registry, room table, pairing,
//!   │                     relay authorization, liveness supervisor
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         └── transport/  Outbound delivery: per-peer channels + test mock
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `podium-core`; its only contact
//!   with the outside world is the `PeerTransport` trait it defines.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.
//!
//! This split keeps the pairing and relay rules fully testable without a real
//! network: the integration tests in `tests/` drive the engine through its
//! public API with a recording transport.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: the room pairing and relay engine.
pub mod application;

/// Infrastructure layer: WebSocket server and transport implementations.
pub mod infrastructure;
