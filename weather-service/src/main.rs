use common::open_meteo::OpenMeteoClient;
use common::tracing::init_tracing_from_env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weather_service::cache::WeatherCache;
use weather_service::config::Config;
use weather_service::handlers::AppState;
use weather_service::orchestrator::WeatherOrchestrator;
use weather_service::pending::PendingTracker;
use weather_service::rate_limit::RateLimitCoordinator;
use weather_service::storage::{DurableStore, FileStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_from_env();

    let config = Config::from_env();
    let cancellation_token = CancellationToken::new();

    let store: Arc<dyn DurableStore> = match &config.storage_dir {
        Some(dir) => {
            let store = FileStore::for_origin(dir, &config.storage_origin).await?;
            info!(dir = %store.dir().display(), "Using file-backed durable storage");
            Arc::new(store)
        }
        None => {
            warn!("STORAGE_DIR not set, cache and cool-down will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = Arc::new(WeatherCache::load(store.clone(), config.cache_ttl()).await);
    let rate_limit =
        Arc::new(RateLimitCoordinator::load(store.clone(), config.rate_limit_cooldown()).await);
    let pending = Arc::new(PendingTracker::new(config.pending_timeout()));
    let upstream = Arc::new(OpenMeteoClient::new(
        config.open_meteo_url.clone(),
        config.request_timeout(),
    ));

    let sweeper = pending
        .clone()
        .spawn_sweeper(config.pending_sweep_interval(), cancellation_token.clone());

    let orchestrator = Arc::new(WeatherOrchestrator::new(
        cache.clone(),
        pending,
        rate_limit.clone(),
        upstream,
        config.orchestrator(),
    ));

    let app = weather_service::create_router(AppState { orchestrator });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Weather service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token))
        .await?;

    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    cache.persist().await;
    rate_limit.persist().await;

    info!("Weather service stopped");
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
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

    // Stop background work; in-flight fetches finish on their own timeout
    cancellation_token.cancel();
    warn!("Cancelled background tasks, shutting down gracefully...");
}
