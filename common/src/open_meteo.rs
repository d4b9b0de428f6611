use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::http_client::HttpClient;
use crate::models::{Coordinates, WeatherSnapshot};
use crate::upstream::WeatherSource;

pub const DEFAULT_OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code";

/// Open-Meteo answers with `current` for the variable API and `current_weather`
/// for the legacy flag; the two families name their fields differently.
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: Option<RawCurrent>,
    current_weather: Option<RawCurrent>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    #[serde(alias = "temperature_2m")]
    temperature: Option<f64>,
    #[serde(alias = "relative_humidity_2m", alias = "relativehumidity_2m")]
    humidity: Option<f64>,
    #[serde(alias = "wind_speed_10m", alias = "windspeed", alias = "windspeed_10m")]
    wind_speed: Option<f64>,
    #[serde(alias = "weathercode")]
    weather_code: Option<f64>,
}

impl OpenMeteoResponse {
    fn into_snapshot(self) -> Result<WeatherSnapshot, AppError> {
        let current = self
            .current
            .or(self.current_weather)
            .ok_or_else(|| AppError::upstream(200, "Response carried no current conditions"))?;

        let temperature = current
            .temperature
            .ok_or_else(|| AppError::upstream(200, "Response carried no temperature"))?;

        Ok(WeatherSnapshot {
            temperature,
            humidity: current.humidity,
            wind_speed: current.wind_speed,
            weather_code: current.weather_code.map(|c| c.max(0.0) as u32).unwrap_or(0),
            fetched_at: Utc::now(),
        })
    }
}

/// Parse a raw Open-Meteo body into the normalized snapshot
pub fn normalize_response(body: &str) -> Result<WeatherSnapshot, AppError> {
    let response: OpenMeteoResponse = serde_json::from_str(body)?;
    response.into_snapshot()
}

pub struct OpenMeteoClient {
    http_client: HttpClient,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            http_client: HttpClient::new(timeout),
            base_url,
        }
    }

    fn url_for(&self, coords: Coordinates) -> String {
        format!(
            "{}?latitude={}&longitude={}&current={}",
            self.base_url, coords.lat, coords.lng, CURRENT_FIELDS
        )
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    #[instrument(skip(self), fields(lat = coords.lat, lng = coords.lng))]
    async fn current_weather(&self, coords: Coordinates) -> Result<WeatherSnapshot, AppError> {
        info!("Fetching weather from Open-Meteo");

        let response: OpenMeteoResponse = self.http_client.get_json(&self.url_for(coords)).await?;
        response.into_snapshot()
    }
}
