//! HTTP status surface: health check and per-session status.
//!
//! - `GET /health` — `{status, activeSessions, uptime}`
//! - `GET /api/session/:id/status` — session status or 404; the id is
//!   upper-cased before lookup so pasted lowercase ids still resolve.
//!
//! No endpoint enumerates sessions; status requires the exact id.

use crate::session::SessionStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use screenlink_proto::{LinkError, LinkResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

struct HttpState {
    store: SessionStore,
    started: Instant,
}

/// Serve the HTTP surface until the process exits.
pub async fn serve(bind: SocketAddr, store: SessionStore, started: Instant) -> LinkResult<()> {
    let state = Arc::new(HttpState { store, started });

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/session/:id/status", get(session_status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| LinkError::Transport(format!("HTTP bind failed: {e}")))?;

    info!(addr = %bind, "HTTP listener started");

    axum::serve(listener, app)
        .await
        .map_err(|e| LinkError::Transport(format!("HTTP server error: {e}")))
}

/// GET /health
async fn health(State(state): State<Arc<HttpState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "activeSessions": state.store.count().await,
        "uptime": state.started.elapsed().as_secs(),
    }))
}

/// GET /api/session/:id/status
async fn session_status(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get(&id.to_uppercase()).await {
        Some(session) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "sessionId": session.id,
                "active": true,
                "clients": session.clients.len(),
                "created": session.created_unix,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        ),
    }
}
