//! Pre-shared API key authentication.
//!
//! Two auth surfaces share one token check: REST endpoints carry
//! `Authorization: Bearer <key>`, and the WebSocket upgrade carries a
//! `?token=<key>` query parameter (browsers can't set headers on WebSocket
//! upgrades). Both funnel into [`token_matches`], which compares in
//! constant time.

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Extension type carrying the expected API key, injected into the router
/// layer so [`require_api_key`] can access it without touching `AppState`.
#[derive(Clone)]
pub struct ApiKey(pub String);

/// Axum middleware guarding the REST surface.
///
/// # Error responses
///
/// - `401 Unauthorized` — no `Authorization` header, or not a Bearer token
/// - `403 Forbidden` — token present but wrong
/// - `500 Internal Server Error` — [`ApiKey`] extension missing (misconfiguration)
pub async fn require_api_key(request: Request, next: Next) -> Response {
    let Some(expected) = request.extensions().get::<ApiKey>().map(|k| k.0.clone()) else {
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "API key not configured");
    };

    let Some(provided) = bearer_token(request.headers()) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            "Expected a Bearer token in the Authorization header",
        );
    };

    if !token_matches(&expected, provided) {
        return reject(StatusCode::FORBIDDEN, "Invalid API key");
    }

    next.run(request).await
}

/// Token check shared by the Bearer middleware and the WebSocket `?token=`
/// path.
pub fn token_matches(expected: &str, provided: &str) -> bool {
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Constant-time comparison: cost depends only on `expected.len()`, so
/// response timing leaks neither the key bytes nor the key length. Missing
/// provided bytes diff against a sentinel instead of short-circuiting.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, &e) in expected.iter().enumerate() {
        diff |= e ^ provided.get(i).copied().unwrap_or(0xff);
    }
    diff == 0
}
