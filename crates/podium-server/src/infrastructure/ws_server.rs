//! WebSocket server: accept loop and per-session pump tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections and upgrading them to WebSocket.
//! 3. Assigning each session a fresh peer id and an outbound lane.
//! 4. Pumping each session: inbound text frames are decoded and handed to
//!    the engine; lane items are written back out to the socket.
//! 5. Reporting the disconnect to the engine exactly once at teardown.
//! 6. Shutting down cleanly when the `running` flag is cleared.
//!
//! Each session runs in its own Tokio task; the accept loop never blocks on
//! session I/O, so one slow client cannot delay others.
//!
//! Malformed inbound JSON is answered with an `error` frame and the session
//! stays up — a client with one buggy message type should not lose its
//! room slot over it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use podium_core::{ClientMessage, DisconnectReason, ErrorCode, PeerId, ServerMessage};

use crate::application::RelayEngine;
use crate::domain::ServerConfig;
use crate::infrastructure::transport::{ChannelTransport, Outbound};

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the main WebSocket accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (port in use,
/// insufficient permissions).
pub async fn run_server(
    config: &ServerConfig,
    engine: Arc<RelayEngine>,
    transport: Arc<ChannelTransport>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

    info!("relay server listening on {}", config.bind_addr);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout on accept() lets the loop re-check the running
        // flag even when no peers are connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let engine = Arc::clone(&engine);
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, engine, transport).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g. file descriptor exhaustion).
                // Log and keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection within the timeout; loop back.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each per-session task. Wraps [`run_session`] so the inner
/// function can use `?` while the outcome is logged here.
async fn handle_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<RelayEngine>,
    transport: Arc<ChannelTransport>,
) {
    match run_session(raw_stream, peer_addr, engine, transport).await {
        Ok(()) => debug!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one peer session.
///
/// The session identity is a server-assigned UUID, minted here at handshake
/// time; the remote address is only used for logging. Teardown always runs
/// the same two steps — detach the lane, report the disconnect — and the
/// engine's disconnect handling is idempotent, so a session whose peer was
/// already evicted by a sweep tears down as a no-op.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    engine: Arc<RelayEngine>,
    transport: Arc<ChannelTransport>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let peer: PeerId = Uuid::new_v4();
    info!(peer = %peer, addr = %peer_addr, "session established");

    let mut lane = transport.attach(peer).await;
    engine.on_connect(peer).await;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Pump loop: engine-originated lane items out, socket frames in.
    loop {
        tokio::select! {
            outbound = lane.recv() => match outbound {
                Some(Outbound::Frame(frame)) => {
                    if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                        debug!(peer = %peer, "socket write failed; ending session");
                        break;
                    }
                }
                Some(Outbound::Close) => {
                    // Forced disconnect (eviction or slot replacement). The
                    // notice frame was already queued ahead of this item.
                    debug!(peer = %peer, "engine requested disconnect");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                None => break, // lane detached elsewhere
            },

            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => engine.handle_message(peer, message).await,
                        Err(e) => {
                            warn!(peer = %peer, "undecodable frame: {e}");
                            let reply = ServerMessage::Error {
                                code: ErrorCode::InvalidPayload,
                                message: format!("undecodable message: {e}"),
                            };
                            send_direct(&mut ws_tx, &reply).await;
                        }
                    }
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    // The protocol is JSON text frames only.
                    warn!(peer = %peer, "unexpected binary frame (ignored)");
                }
                Some(Ok(WsMessage::Ping(_))) => {
                    // tokio-tungstenite queues the protocol-level Pong
                    // automatically on the next write.
                    debug!(peer = %peer, "WebSocket ping");
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) => {
                    debug!(peer = %peer, "peer sent Close frame");
                    break;
                }
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!(peer = %peer, "socket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(peer = %peer, "socket error: {e}");
                    break;
                }
                None => break,
            },
        }
    }

    transport.detach(peer).await;
    engine.on_disconnect(peer, DisconnectReason::TransportClosed).await;
    Ok(())
}

/// Serializes and writes one frame outside the lane (used for decode errors,
/// which never reach the engine). Write failures end the session on the
/// next loop iteration anyway, so they are only logged here.
async fn send_direct<S>(ws_tx: &mut S, message: &ServerMessage)
where
    S: SinkExt<WsMessage> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(frame) => {
            if ws_tx.send(WsMessage::Text(frame)).await.is_err() {
                debug!("direct write failed");
            }
        }
        Err(e) => error!("failed to serialize error frame: {e}"),
    }
}
