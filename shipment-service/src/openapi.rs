use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{GeocodeResult, PlaceQuery, PlaceWeather, ShipmentWeather, WeatherSnapshot};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::place_weather,
        handlers::enrich_shipment,
    ),
    components(schemas(
        PlaceQuery,
        GeocodeResult,
        WeatherSnapshot,
        PlaceWeather,
        ShipmentWeather,
        handlers::EnrichShipmentRequest,
    )),
    tags(
        (name = "shipments", description = "Weather enrichment at shipment creation"),
    ),
)]
struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
