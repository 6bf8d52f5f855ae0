//! Infrastructure layer: everything that touches a real socket.
//!
//! The application layer talks to peers only through the
//! [`PeerTransport`](crate::application::PeerTransport) port; this layer
//! provides the WebSocket-backed implementation and the accept loop, plus a
//! recording double used by the test suites.

pub mod transport;
pub mod ws_server;

pub use transport::ChannelTransport;
pub use ws_server::run_server;
