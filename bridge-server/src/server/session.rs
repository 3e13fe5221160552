//! Per-socket frame loop
//!
//! Each accepted WebSocket gets its own task; inside the task frames are
//! processed strictly one at a time so replies never interleave. Different
//! sockets are fully independent - a slow printer on one does not block
//! another.

use crate::server::{AppState, commands};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::debug;

pub async fn run(socket: WebSocket, state: AppState, peer: SocketAddr) {
    debug!(%peer, "WebSocket session opened");

    let (mut sink, mut stream) = socket.split();

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                // Unparseable frames produce no reply and no disconnect
                let Some(reply) = commands::handle_frame(&state, text.as_str()).await else {
                    continue;
                };
                if sink.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = sink.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // Binary, Pong - ignore
            Err(e) => {
                debug!(%peer, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    debug!(%peer, "WebSocket session closed");
}
