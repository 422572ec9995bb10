use axum::{
    extract::State,
    routing::{get, post},
    Router,
};

use crate::{
    api::{
        error::ApiError,
        health::{get_status, healthz},
        response::{success, ApiResponse},
    },
    controller::AppState,
    domain::{build_report, MeterReadings, SensorReport},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sensors", get(get_sensors))
        .route("/readings", get(get_readings))
        .route("/status", get(get_status))
        .route("/refresh", post(refresh))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn get_sensors(State(st): State<AppState>) -> ApiResponse<SensorReport> {
    let snap = st.poller.snapshot().await;
    success(build_report(
        &st.account,
        snap.readings.as_ref(),
        snap.last_update_success,
    ))
}

pub async fn get_readings(
    State(st): State<AppState>,
) -> Result<ApiResponse<MeterReadings>, ApiError> {
    st.poller
        .snapshot()
        .await
        .readings
        .map(success)
        .ok_or_else(|| ApiError::NotFound("no meter readings yet".into()))
}

/// POST /api/v1/refresh - poll the portal now
///
/// The poll runs as its own task so a request timeout or a dropped
/// connection still lets it finish and record its outcome.
pub async fn refresh(State(st): State<AppState>) -> Result<ApiResponse<MeterReadings>, ApiError> {
    let poller = st.poller.clone();
    let readings = tokio::spawn(async move { poller.poll().await })
        .await
        .map_err(|e| ApiError::InternalError(format!("refresh task failed: {e}")))??;
    Ok(success(readings))
}
