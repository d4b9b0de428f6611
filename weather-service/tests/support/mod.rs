#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use common::errors::AppError;
use common::models::{Coordinates, WeatherSnapshot};
use common::upstream::WeatherSource;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use weather_service::cache::WeatherCache;
use weather_service::orchestrator::{OrchestratorConfig, WeatherOrchestrator};
use weather_service::pending::PendingTracker;
use weather_service::rate_limit::RateLimitCoordinator;
use weather_service::storage::{DurableStore, MemoryStore};

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok(f64),
    RateLimited,
    ServerError,
}

/// Call-counting upstream that plays back scripted replies, then succeeds.
pub struct StubWeather {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    delay: Duration,
}

impl StubWeather {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    pub fn with_delay(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    /// Most calls that were ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for StubWeather {
    async fn current_weather(&self, _coords: Coordinates) -> Result<WeatherSnapshot, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Ok(20.0));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Ok(temperature) => Ok(snapshot(temperature)),
            Reply::RateLimited => Err(AppError::rate_limited("stub 429")),
            Reply::ServerError => Err(AppError::upstream(500, "stub failure")),
        }
    }
}

pub fn snapshot(temperature: f64) -> WeatherSnapshot {
    WeatherSnapshot {
        temperature,
        humidity: Some(60.0),
        wind_speed: Some(3.5),
        weather_code: 1,
        fetched_at: Utc::now(),
    }
}

/// Small timings so tests run in milliseconds
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        request_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        poll_attempts: 100,
        inter_request_delay: Duration::ZERO,
        max_startup_jitter: Duration::ZERO,
        max_targets: 5,
    }
}

pub struct Harness {
    pub orchestrator: Arc<WeatherOrchestrator>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(upstream: Arc<dyn WeatherSource>, config: OrchestratorConfig) -> Harness {
    harness_with_cooldown(upstream, config, Duration::from_secs(300))
}

pub fn harness_with_cooldown(
    upstream: Arc<dyn WeatherSource>,
    config: OrchestratorConfig,
    cooldown: Duration,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let durable: Arc<dyn DurableStore> = store.clone();
    let cache = Arc::new(WeatherCache::with_ttl(
        durable.clone(),
        Duration::from_secs(600),
    ));
    let rate_limit = Arc::new(RateLimitCoordinator::new(durable, cooldown));
    let pending = Arc::new(PendingTracker::new(Duration::from_secs(30)));

    Harness {
        orchestrator: Arc::new(WeatherOrchestrator::new(
            cache, pending, rate_limit, upstream, config,
        )),
        store,
    }
}

/// Store whose writes always fail, like a full quota
pub struct FailingStore;

#[async_trait]
impl DurableStore for FailingStore {
    async fn read(&self, _key: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }

    async fn write(&self, _key: &str, _value: &str) -> Result<(), AppError> {
        Err(AppError::storage("quota exceeded"))
    }
}
