use common::geocoding::NominatimClient;
use common::open_meteo::OpenMeteoClient;
use common::tracing::init_tracing_from_env;
use shipment_service::config::Config;
use shipment_service::enrichment::ShipmentEnricher;
use shipment_service::handlers::AppState;
use shipment_service::pipeline::WeatherPipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_from_env();

    let config = Config::from_env();

    let geocoder = Arc::new(NominatimClient::new(
        config.geocoder_url.clone(),
        &config.geocoder_user_agent,
        config.request_timeout(),
    ));
    let weather = Arc::new(OpenMeteoClient::new(
        config.open_meteo_url.clone(),
        config.request_timeout(),
    ));
    let pipeline = Arc::new(WeatherPipeline::new(geocoder, weather, config.pipeline()));
    let enricher = Arc::new(ShipmentEnricher::new(pipeline, config.inter_place_delay()));

    let app = shipment_service::create_router(AppState { enricher });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Shipment service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shipment service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    warn!("Shutting down gracefully...");
}
