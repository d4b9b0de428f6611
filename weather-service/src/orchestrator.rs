use common::errors::AppError;
use common::models::{
    BatchSummary, BatchWeatherResponse, CityWeather, CoordinateKey, Coordinates, FetchStatus,
    WeatherSnapshot, WeatherTarget,
};
use common::upstream::WeatherSource;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::cache::WeatherCache;
use crate::pending::PendingTracker;
use crate::rate_limit::RateLimitCoordinator;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub inter_request_delay: Duration,
    pub max_startup_jitter: Duration,
    pub max_targets: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            poll_attempts: 25,
            inter_request_delay: Duration::from_secs(3),
            max_startup_jitter: Duration::from_millis(1500),
            max_targets: 5,
        }
    }
}

/// Where a successful lookup came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Cache,
    /// Another caller's in-flight fetch populated the cache while we waited
    Shared,
    Upstream,
}

enum OwnerOutcome {
    Delivered(WeatherSnapshot),
    /// Owner finished without a result
    Released,
    /// Owner still holds the key after the bounded wait
    Unresponsive,
}

/// Entry point for widgets: get-or-fetch with de-duplication and cool-down.
pub struct WeatherOrchestrator {
    cache: Arc<WeatherCache>,
    pending: Arc<PendingTracker>,
    rate_limit: Arc<RateLimitCoordinator>,
    upstream: Arc<dyn WeatherSource>,
    config: OrchestratorConfig,
}

impl WeatherOrchestrator {
    pub fn new(
        cache: Arc<WeatherCache>,
        pending: Arc<PendingTracker>,
        rate_limit: Arc<RateLimitCoordinator>,
        upstream: Arc<dyn WeatherSource>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cache,
            pending,
            rate_limit,
            upstream,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<WeatherCache> {
        &self.cache
    }

    pub fn pending(&self) -> &Arc<PendingTracker> {
        &self.pending
    }

    pub fn rate_limit(&self) -> &Arc<RateLimitCoordinator> {
        &self.rate_limit
    }

    pub async fn get_weather(&self, coords: Coordinates) -> Result<WeatherSnapshot, AppError> {
        self.resolve(coords).await.map(|(snapshot, _)| snapshot)
    }

    #[instrument(skip(self), fields(key = %coords.key()))]
    pub async fn resolve(
        &self,
        coords: Coordinates,
    ) -> Result<(WeatherSnapshot, Resolution), AppError> {
        coords.validate()?;
        let key = coords.key();

        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache hit");
            return Ok((hit, Resolution::Cache));
        }

        if self.rate_limit.is_limited().await {
            debug!("Upstream cool-down active, not fetching");
            return Err(rate_limited(&key));
        }

        loop {
            if self.pending.try_mark_pending(&key).await {
                // An owner may have stored and released the key since the first lookup
                if let Some(hit) = self.cache.get(&key).await {
                    self.pending.clear_pending(&key).await;
                    debug!("Cache filled before we took ownership");
                    return Ok((hit, Resolution::Cache));
                }
                break;
            }

            match self.wait_for_owner(&key).await? {
                OwnerOutcome::Delivered(shared) => return Ok((shared, Resolution::Shared)),
                // Compete for ownership again so only one waiter re-fetches
                OwnerOutcome::Released => continue,
                OwnerOutcome::Unresponsive => {
                    // A duplicate upstream call is possible here
                    info!("Pending fetch did not resolve, fetching ourselves");
                    self.pending.mark_pending(&key).await;
                    break;
                }
            }
        }

        self.fetch_and_store(coords, &key)
            .await
            .map(|snapshot| (snapshot, Resolution::Upstream))
    }

    /// Poll the cache while another caller owns the fetch for `key`.
    async fn wait_for_owner(&self, key: &CoordinateKey) -> Result<OwnerOutcome, AppError> {
        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(hit) = self.cache.get(key).await {
                debug!(attempt, "In-flight fetch resolved");
                return Ok(OwnerOutcome::Delivered(hit));
            }
            if self.rate_limit.is_limited().await {
                return Err(rate_limited(key));
            }
            if !self.pending.is_pending(key).await {
                debug!(attempt, "In-flight fetch ended without populating the cache");
                return Ok(OwnerOutcome::Released);
            }
        }
        Ok(OwnerOutcome::Unresponsive)
    }

    async fn fetch_and_store(
        &self,
        coords: Coordinates,
        key: &CoordinateKey,
    ) -> Result<WeatherSnapshot, AppError> {
        let result = timeout(
            self.config.request_timeout,
            self.upstream.current_weather(coords),
        )
        .await
        .map_err(|_| AppError::timeout(format!("Weather fetch for {} timed out", key)))
        .and_then(|inner| inner);

        match result {
            Ok(snapshot) => {
                // Populate before clearing so a waiter always finds the result
                self.cache.set(key.clone(), snapshot.clone()).await;
                self.pending.clear_pending(key).await;
                info!("Fetched and cached weather");
                Ok(snapshot)
            }
            Err(e) => {
                // Arm the cool-down before releasing waiters
                if e.is_rate_limited() {
                    self.rate_limit.set_limited().await;
                } else {
                    warn!(error = %e, "Weather fetch failed");
                }
                self.pending.clear_pending(key).await;
                Err(e)
            }
        }
    }

    /// Resolve a widget's target list one at a time.
    ///
    /// Upstream calls are spaced by `inter_request_delay`; cache hits are not.
    /// Once a rate limit is seen the rest of the list is abandoned.
    #[instrument(skip(self, targets), fields(target_count = targets.len()))]
    pub async fn get_weather_batch(
        &self,
        mut targets: Vec<WeatherTarget>,
    ) -> Result<BatchWeatherResponse, AppError> {
        if targets.is_empty() {
            return Err(AppError::validation("At least one target is required"));
        }
        if targets.len() > self.config.max_targets {
            warn!(
                requested = targets.len(),
                max = self.config.max_targets,
                "Too many targets, ignoring the excess"
            );
            targets.truncate(self.config.max_targets);
        }

        self.startup_jitter().await;

        let mut cities = Vec::with_capacity(targets.len());
        let mut upstream_calls = 0usize;
        let mut remaining = targets.into_iter();

        while let Some(target) = remaining.next() {
            let coords = target.coordinates();
            let key = coords.key();
            let span = info_span!("batch_target", name = %target.name, key = %key);

            let needs_upstream = coords.validate().is_ok() && self.cache.get(&key).await.is_none();
            if needs_upstream && upstream_calls > 0 && !self.config.inter_request_delay.is_zero() {
                debug!(
                    wait_ms = self.config.inter_request_delay.as_millis() as u64,
                    "Spacing upstream requests"
                );
                tokio::time::sleep(self.config.inter_request_delay).await;
            }

            let outcome = self.resolve(coords).instrument(span).await;
            match outcome {
                Ok((snapshot, resolution)) => {
                    if resolution == Resolution::Upstream {
                        upstream_calls += 1;
                    }
                    let status = match resolution {
                        Resolution::Upstream => FetchStatus::Fresh,
                        Resolution::Cache | Resolution::Shared => FetchStatus::Cached,
                    };
                    cities.push(city(target.name, key, status, Some(snapshot), None));
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(name = %target.name, "Rate limited, abandoning remaining targets");
                    cities.push(city(
                        target.name,
                        key,
                        FetchStatus::RateLimited,
                        None,
                        Some(e.to_string()),
                    ));
                    for skipped in remaining.by_ref() {
                        let key = skipped.coordinates().key();
                        cities.push(city(
                            skipped.name,
                            key,
                            FetchStatus::RateLimited,
                            None,
                            Some("Skipped: upstream cool-down active".to_string()),
                        ));
                    }
                }
                Err(e) => {
                    if matches!(e, AppError::ValidationError(_)) {
                        debug!(error = %e, "Skipping invalid target");
                    } else {
                        // The attempt still went to the upstream
                        upstream_calls += 1;
                    }
                    cities.push(city(
                        target.name,
                        key,
                        FetchStatus::Unavailable,
                        None,
                        Some(e.to_string()),
                    ));
                }
            }
        }

        let summary = BatchSummary::from_cities(&cities);
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            rate_limited = summary.rate_limited,
            "Batch weather lookup completed"
        );

        Ok(BatchWeatherResponse { cities, summary })
    }

    async fn startup_jitter(&self) {
        let max_ms = self.config.max_startup_jitter.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms));
        debug!(wait_ms = jitter.as_millis() as u64, "Startup jitter");
        tokio::time::sleep(jitter).await;
    }
}

fn rate_limited(key: &CoordinateKey) -> AppError {
    AppError::rate_limited(format!("Upstream cool-down active, not fetching {}", key))
}

fn city(
    name: String,
    key: CoordinateKey,
    status: FetchStatus,
    weather: Option<WeatherSnapshot>,
    error: Option<String>,
) -> CityWeather {
    CityWeather {
        name,
        key,
        status,
        weather,
        error,
    }
}
