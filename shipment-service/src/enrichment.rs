use common::models::{PlaceQuery, ShipmentWeather};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::pipeline::WeatherPipeline;

/// Shipment-creation side of the pipeline: origin first, then destination.
///
/// The pipeline keeps no rate state, so the spacing between the two places
/// lives here.
pub struct ShipmentEnricher {
    pipeline: Arc<WeatherPipeline>,
    inter_place_delay: Duration,
}

impl ShipmentEnricher {
    pub fn new(pipeline: Arc<WeatherPipeline>, inter_place_delay: Duration) -> Self {
        Self {
            pipeline,
            inter_place_delay,
        }
    }

    pub fn pipeline(&self) -> &Arc<WeatherPipeline> {
        &self.pipeline
    }

    #[instrument(skip_all, fields(origin = %origin.city, destination = %destination.city))]
    pub async fn enrich(&self, origin: &PlaceQuery, destination: &PlaceQuery) -> ShipmentWeather {
        let origin_weather = self.pipeline.resolve_weather_for_place(origin).await;

        tokio::time::sleep(self.inter_place_delay).await;

        let destination_weather = self.pipeline.resolve_weather_for_place(destination).await;

        info!(
            origin_enriched = origin_weather.is_some(),
            destination_enriched = destination_weather.is_some(),
            "Shipment weather enrichment finished"
        );

        ShipmentWeather {
            origin: origin_weather,
            destination: destination_weather,
        }
    }
}
