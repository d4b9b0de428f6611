use axum::{
    extract::{Query, State},
    response::Json,
};
use common::errors::AppError;
use common::models::{PlaceQuery, PlaceWeather, ShipmentWeather};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::enrichment::ShipmentEnricher;

#[derive(Clone)]
pub struct AppState {
    pub enricher: Arc<ShipmentEnricher>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "shipment-service" }))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlaceParams {
    pub city: String,
    #[serde(default)]
    pub country: String,
}

#[utoipa::path(
    get,
    path = "/api/places/weather",
    params(PlaceParams),
    responses(
        (status = 200, description = "Coordinates and weather, or null when unavailable", body = Option<PlaceWeather>),
        (status = 400, description = "City missing")
    ),
    tag = "shipments"
)]
pub async fn place_weather(
    State(state): State<AppState>,
    Query(params): Query<PlaceParams>,
) -> Result<Json<Option<PlaceWeather>>, AppError> {
    if params.city.trim().is_empty() {
        return Err(AppError::validation("city must not be empty"));
    }
    info!(city = %params.city, country = %params.country, "Place weather request received");

    let place = PlaceQuery::new(params.city, params.country);
    let weather = state
        .enricher
        .pipeline()
        .resolve_weather_for_place(&place)
        .await;

    Ok(Json(weather))
}

#[derive(Deserialize, ToSchema)]
pub struct EnrichShipmentRequest {
    pub origin: PlaceQuery,
    pub destination: PlaceQuery,
}

#[utoipa::path(
    post,
    path = "/api/shipments/weather",
    request_body = EnrichShipmentRequest,
    responses(
        (status = 200, description = "Weather enrichment for the shipment record; missing places are null", body = ShipmentWeather)
    ),
    tag = "shipments"
)]
pub async fn enrich_shipment(
    State(state): State<AppState>,
    Json(request): Json<EnrichShipmentRequest>,
) -> Json<ShipmentWeather> {
    info!(
        origin = %request.origin.city,
        destination = %request.destination.city,
        "Shipment enrichment request received"
    );

    Json(
        state
            .enricher
            .enrich(&request.origin, &request.destination)
            .await,
    )
}
