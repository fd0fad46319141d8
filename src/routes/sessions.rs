//! Authenticated session management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::AppState;

/// `GET /api/sessions` — list live terminal sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.registry.list().await;
    Json(json!({
        "sessions": sessions,
        "max_sessions": state.config.server.max_sessions,
    }))
}

/// `DELETE /api/sessions/{id}` — signal a session to tear down.
///
/// The session unwinds asynchronously; its WebSocket closes once the shell
/// channel is down. Returns `404` for unknown ids.
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.registry.close(&id).await {
        info!(session_id = %id, "Session close requested via REST");
        (StatusCode::OK, Json(json!({"closing": id}))).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "No such session"})),
        )
            .into_response()
    }
}
