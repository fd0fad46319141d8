//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/health` — liveness probe.
///
/// Returns status, uptime, version, live session count, and the gateway
/// address when the tunnel gateway is enabled. No authentication required,
/// suitable for load-balancer health checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let sessions = state.registry.session_count().await;

    let gateway = state
        .config
        .gateway
        .as_ref()
        .map_or(json!(null), |gw| json!({ "listen": gw.listen }));

    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": sessions,
        "egress": state.egress_mode,
        "gateway": gateway,
    }))
}
