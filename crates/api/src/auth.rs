use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::AppState;

/// Rejects `/api/*` requests without `Authorization: Bearer <DASHBOARD_TOKEN>`.
pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if token_matches(&state, token) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        unauthorized()
    }
}

/// Empty tokens never match, even if the configured one is empty.
pub fn token_matches(state: &AppState, token: Option<&str>) -> bool {
    matches!(token, Some(t) if !t.is_empty() && t == state.dashboard_token)
}

pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response()
}
