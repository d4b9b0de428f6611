use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use common::errors::AppError;
use common::models::{BatchWeatherResponse, Coordinates, WeatherSnapshot, WeatherTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::orchestrator::WeatherOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WeatherOrchestrator>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "weather-service" }))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CoordinateQuery {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
}

#[utoipa::path(
    get,
    path = "/api/weather",
    params(CoordinateQuery),
    responses(
        (status = 200, description = "Current weather for the coordinate", body = WeatherSnapshot),
        (status = 400, description = "Coordinates out of range"),
        (status = 429, description = "Upstream cool-down active"),
        (status = 502, description = "Upstream failure"),
        (status = 504, description = "Upstream timed out")
    ),
    tag = "weather"
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<WeatherSnapshot>, AppError> {
    info!(lat = query.lat, lng = query.lng, "Weather request received");

    let weather = state
        .orchestrator
        .get_weather(Coordinates::new(query.lat, query.lng))
        .await?;

    Ok(Json(weather))
}

#[derive(Deserialize, ToSchema)]
pub struct BatchRequest {
    pub targets: Vec<WeatherTarget>,
}

#[utoipa::path(
    post,
    path = "/api/weather/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Per-target weather, degraded entries inline", body = BatchWeatherResponse),
        (status = 400, description = "Empty target list")
    ),
    tag = "weather"
)]
pub async fn get_weather_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchWeatherResponse>, AppError> {
    info!(count = request.targets.len(), "Batch weather request received");

    let response = state.orchestrator.get_weather_batch(request.targets).await?;

    Ok(Json(response))
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CoordinatorStatus {
    pub rate_limited: bool,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub cached_entries: usize,
    pub pending_requests: usize,
}

#[utoipa::path(
    get,
    path = "/api/weather/status",
    responses(
        (status = 200, description = "Cache and cool-down state", body = CoordinatorStatus)
    ),
    tag = "weather"
)]
pub async fn status(State(state): State<AppState>) -> Json<CoordinatorStatus> {
    let orchestrator = &state.orchestrator;
    let rate_limited = orchestrator.rate_limit().is_limited().await;
    let until = orchestrator.rate_limit().status().await.until;

    Json(CoordinatorStatus {
        rate_limited,
        rate_limited_until: rate_limited.then_some(until),
        cached_entries: orchestrator.cache().fresh_len().await,
        pending_requests: orchestrator.pending().len().await,
    })
}
