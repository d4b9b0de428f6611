use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Decimal places kept when deriving a cache key from coordinates.
pub const COORDINATE_KEY_PRECISION: i32 = 4;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::validation(format!(
                "Latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::validation(format!(
                "Longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey::from_coordinates(self)
    }
}

/// Cache slot identifier: coordinates rounded to four decimal places.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CoordinateKey(String);

impl CoordinateKey {
    pub fn from_coordinates(coords: &Coordinates) -> Self {
        Self(format!(
            "{:.4},{:.4}",
            round_coordinate(coords.lat),
            round_coordinate(coords.lng)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_KEY_PRECISION);
    let rounded = (value * scale).round() / scale;
    // -0.0 and 0.0 must share a key
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Current conditions, normalized from whatever field names the upstream used
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub weather_code: u32,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// WMO weather interpretation code as a short label
    pub fn condition(&self) -> &'static str {
        match self.weather_code {
            0 => "Clear sky",
            1..=3 => "Partly cloudy",
            45 | 48 => "Foggy",
            51 | 53 | 55 => "Drizzle",
            56 | 57 => "Freezing drizzle",
            61 | 63 | 65 => "Rain",
            66 | 67 => "Freezing rain",
            71 | 73 | 75 | 77 => "Snow",
            80..=82 => "Rain showers",
            85 | 86 => "Snow showers",
            95 => "Thunderstorm",
            96 | 99 => "Thunderstorm with hail",
            _ => "Unknown",
        }
    }
}

/// Best geocoding candidate for a free-text place
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl GeocodeResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

/// Free-text place as entered on a shipment
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct PlaceQuery {
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl PlaceQuery {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
        }
    }

    /// Geocoder query text, `"city, country"` or just the city
    pub fn query_text(&self) -> String {
        let city = self.city.trim();
        let country = self.country.trim();
        if country.is_empty() {
            city.to_string()
        } else {
            format!("{}, {}", city, country)
        }
    }
}

/// Weather plus the coordinates it was fetched for
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct PlaceWeather {
    pub coordinates: GeocodeResult,
    pub weather: WeatherSnapshot,
}

/// Weather enrichment embedded into a shipment record
#[derive(Debug, Serialize, Deserialize, Clone, Default, ToSchema)]
pub struct ShipmentWeather {
    pub origin: Option<PlaceWeather>,
    pub destination: Option<PlaceWeather>,
}

/// One coordinate a widget wants weather for
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct WeatherTarget {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl WeatherTarget {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Fetched from the upstream during this call
    Fresh,
    /// Served from the cache, or from another caller's in-flight fetch
    Cached,
    /// Skipped or refused because of an active cool-down
    RateLimited,
    /// Timeout, transport or payload failure
    Unavailable,
}

/// Per-target outcome of a batch lookup
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct CityWeather {
    pub name: String,
    pub key: CoordinateKey,
    pub status: FetchStatus,
    pub weather: Option<WeatherSnapshot>,
    pub error: Option<String>,
}

/// Batch response for multiple widget targets
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchWeatherResponse {
    pub cities: Vec<CityWeather>,
    pub summary: BatchSummary,
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub rate_limited: usize,
}

impl BatchSummary {
    pub fn from_cities(cities: &[CityWeather]) -> Self {
        let mut summary = Self {
            total: cities.len(),
            ..Self::default()
        };
        for city in cities {
            match city.status {
                FetchStatus::Fresh | FetchStatus::Cached => summary.successful += 1,
                FetchStatus::RateLimited => summary.rate_limited += 1,
                FetchStatus::Unavailable => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_duplicate_coordinates_share_a_key() {
        let a = Coordinates::new(19.07601, 72.87771);
        let b = Coordinates::new(19.076049, 72.877651);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "19.0760,72.8777");
    }

    #[test]
    fn negative_zero_normalizes() {
        let a = Coordinates::new(-0.00001, 0.0);
        let b = Coordinates::new(0.0, -0.00004);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "0.0000,0.0000");
    }

    #[test]
    fn distinct_cities_do_not_collide() {
        let london = Coordinates::new(51.5074, -0.1278);
        let paris = Coordinates::new(48.8566, 2.3522);
        assert_ne!(london.key(), paris.key());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinates::new(91.0, 0.0).validate().is_err());
        assert!(Coordinates::new(0.0, -180.5).validate().is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
        assert!(Coordinates::new(-33.8688, 151.2093).validate().is_ok());
    }

    #[test]
    fn place_query_text_skips_empty_country() {
        assert_eq!(PlaceQuery::new("Mumbai", "India").query_text(), "Mumbai, India");
        assert_eq!(PlaceQuery::new(" Lagos ", "  ").query_text(), "Lagos");
    }
}
