//! Forward geocoding against Nominatim (OpenStreetMap).
//!
//! The public instance allows one request per second and requires an
//! identifying `User-Agent`; callers own the pacing.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::http_client::HttpClient;
use crate::models::{GeocodeResult, PlaceQuery};
use crate::upstream::Geocoder;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "shipment-service/0.1.0 (logistics weather enrichment)";

#[derive(Debug, Deserialize)]
struct NominatimCandidate {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

impl NominatimCandidate {
    fn into_result(self) -> Result<GeocodeResult, AppError> {
        let lat = self
            .lat
            .parse::<f64>()
            .map_err(|_| AppError::upstream(200, format!("Unparseable latitude {:?}", self.lat)))?;
        let lng = self
            .lon
            .parse::<f64>()
            .map_err(|_| AppError::upstream(200, format!("Unparseable longitude {:?}", self.lon)))?;

        Ok(GeocodeResult {
            lat,
            lng,
            display_name: self.display_name,
        })
    }
}

pub struct NominatimClient {
    http_client: HttpClient,
    base_url: String,
}

impl NominatimClient {
    pub fn new(base_url: String, user_agent: &str, timeout: Duration) -> Self {
        Self {
            http_client: HttpClient::with_user_agent(timeout, user_agent),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    #[instrument(skip(self), fields(city = %place.city, country = %place.country))]
    async fn geocode(&self, place: &PlaceQuery) -> Result<Option<GeocodeResult>, AppError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(&place.query_text())
        );

        let candidates: Vec<NominatimCandidate> = self.http_client.get_json(&url).await?;

        match candidates.into_iter().next() {
            Some(best) => {
                let result = best.into_result()?;
                info!(lat = result.lat, lng = result.lng, "Geocoded place");
                Ok(Some(result))
            }
            None => {
                info!("Geocoder returned no candidates");
                Ok(None)
            }
        }
    }
}
