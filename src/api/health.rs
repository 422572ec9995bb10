use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    api::response::{success, ApiResponse},
    controller::{AppState, HealthStatus},
};

/// GET /healthz - liveness probe
pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /api/v1/status - portal session and polling health
///
/// `healthy` once a poll has succeeded on an authenticated session,
/// `degraded` when the latest poll failed, `not_authenticated` when
/// there is no live portal session.
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<HealthStatus> {
    success(state.poller.health().await)
}
