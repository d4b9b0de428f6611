pub mod cache;
pub mod config;
pub mod handlers;
pub mod openapi;
pub mod orchestrator;
pub mod pending;
pub mod rate_limit;
pub mod storage;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: handlers::AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/weather", get(handlers::get_weather))
        .route("/api/weather/batch", post(handlers::get_weather_batch))
        .route("/api/weather/status", get(handlers::status))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
