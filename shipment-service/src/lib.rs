pub mod config;
pub mod enrichment;
pub mod handlers;
pub mod openapi;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: handlers::AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/places/weather", get(handlers::place_weather))
        .route("/api/shipments/weather", post(handlers::enrich_shipment))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
