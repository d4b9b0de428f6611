use common::errors::AppError;
use common::models::{GeocodeResult, PlaceQuery, PlaceWeather, WeatherSnapshot};
use common::upstream::{Geocoder, WeatherSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub request_timeout: Duration,
    /// Pause between the geocode and weather stages (geocoder allows 1 req/s)
    pub inter_stage_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            inter_stage_delay: Duration::from_millis(1100),
        }
    }
}

/// Geocode a free-text place, then fetch its current weather.
///
/// Stateless: nothing is cached and no rate-limit flag is shared between
/// invocations. Every failure degrades to `None`.
pub struct WeatherPipeline {
    geocoder: Arc<dyn Geocoder>,
    weather: Arc<dyn WeatherSource>,
    config: PipelineConfig,
}

impl WeatherPipeline {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        weather: Arc<dyn WeatherSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            geocoder,
            weather,
            config,
        }
    }

    #[instrument(skip(self, place), fields(city = %place.city, country = %place.country))]
    pub async fn resolve_weather_for_place(&self, place: &PlaceQuery) -> Option<PlaceWeather> {
        if place.city.trim().is_empty() {
            warn!("No city given, skipping weather lookup");
            return None;
        }

        let coordinates = match self.geocode(place).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                info!("Place not found, shipment will carry no weather");
                return None;
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Geocoding failed");
                return None;
            }
        };

        tokio::time::sleep(self.config.inter_stage_delay).await;

        match self.current_weather(&coordinates).await {
            Ok(weather) => {
                info!(
                    lat = coordinates.lat,
                    lng = coordinates.lng,
                    temperature = weather.temperature,
                    "Resolved weather for place"
                );
                Some(PlaceWeather {
                    coordinates,
                    weather,
                })
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Weather fetch failed");
                None
            }
        }
    }

    async fn geocode(&self, place: &PlaceQuery) -> Result<Option<GeocodeResult>, AppError> {
        let result = timeout(self.config.request_timeout, self.geocoder.geocode(place))
            .await
            .map_err(|_| AppError::timeout(format!("Geocoding {} timed out", place.query_text())))?;

        match result {
            Err(AppError::NotFound(_)) => Ok(None),
            Ok(Some(found)) if found.coordinates().validate().is_err() => {
                Err(AppError::upstream(200, "Geocoder returned out-of-range coordinates"))
            }
            other => other,
        }
    }

    async fn current_weather(&self, coordinates: &GeocodeResult) -> Result<WeatherSnapshot, AppError> {
        timeout(
            self.config.request_timeout,
            self.weather.current_weather(coordinates.coordinates()),
        )
        .await
        .map_err(|_| AppError::timeout("Weather fetch timed out"))?
    }
}
