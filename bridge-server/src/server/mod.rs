//! WebSocket command server
//!
//! One HTTP listener whose only job is upgrading browser connections to
//! WebSocket and feeding frames into the command dispatcher. Requests that
//! are not WebSocket handshakes get a 400; origins outside the allow-list
//! get a 403.

pub mod commands;
pub mod session;

use crate::supervisor::Supervisor;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on one inbound command frame; larger frames terminate the
/// socket instead of buffering unbounded payloads
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Shared handles every command needs
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub origins: Arc<OriginPolicy>,
    /// Port the server listens on, echoed by `getInfo`
    pub port: u16,
}

/// Browser-origin allow-list
///
/// An empty list means permissive mode. Local development origins
/// (`http://localhost:*`, `http://127.0.0.1:*`) are always allowed, as are
/// peers that send no Origin header at all (non-browser tools).
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        let allowed: Vec<String> = allowed
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if allowed.is_empty() {
            warn!("No allowed origins configured, accepting WebSocket connections from any origin");
        }
        Self { allowed }
    }

    pub fn permits(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            // No Origin header: not a browser
            return true;
        };
        if self.allowed.is_empty() {
            return true;
        }
        if origin.starts_with("http://localhost:") || origin.starts_with("http://127.0.0.1:") {
            return true;
        }
        self.allowed.iter().any(|allowed| allowed == origin)
    }
}

/// Serve the command surface until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = Router::new().fallback(ws_handler).with_state(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origins.permits(origin) {
        warn!(%peer, origin = origin.unwrap_or("<none>"), "Rejected WebSocket origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Ok(upgrade) = upgrade else {
        debug!(%peer, "Not a WebSocket handshake");
        return StatusCode::BAD_REQUEST.into_response();
    };

    upgrade
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| session::run(socket, state, peer))
}
