//! Application layer: the room pairing and relay engine.
//!
//! - [`registry`] – connection registry: live peer handles and liveness
//!   timestamps.
//! - [`rooms`] – room table: short codes mapped to a display/controller
//!   slot pair.
//! - [`engine`] – the single logical owner of both structures; pairing
//!   protocol, relay authorization, and the snapshot surface.
//! - [`supervisor`] – the periodic probe/eviction/expiry sweeps.

pub mod engine;
pub mod registry;
pub mod rooms;
pub mod supervisor;

pub use engine::{PeerTransport, RelayEngine, ServerSnapshot};
pub use registry::{ConnectionCounters, ConnectionRegistry, Peer};
pub use rooms::{Room, RoomSummary, RoomTable, SlotView};
pub use supervisor::spawn_supervisor;
