//! Seams between the coordinators and the third-party HTTP APIs.

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{Coordinates, GeocodeResult, PlaceQuery, WeatherSnapshot};

/// Source of current conditions for a coordinate pair
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_weather(&self, coords: Coordinates) -> Result<WeatherSnapshot, AppError>;
}

/// Resolves free-text places to coordinates.
///
/// `Ok(None)` means the geocoder answered but had no candidates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, place: &PlaceQuery) -> Result<Option<GeocodeResult>, AppError>;
}
