use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{
    BatchSummary, BatchWeatherResponse, CityWeather, CoordinateKey, FetchStatus, WeatherSnapshot,
    WeatherTarget,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_weather,
        handlers::get_weather_batch,
        handlers::status,
    ),
    components(schemas(
        WeatherSnapshot,
        WeatherTarget,
        CityWeather,
        CoordinateKey,
        FetchStatus,
        BatchSummary,
        BatchWeatherResponse,
        handlers::BatchRequest,
        handlers::CoordinatorStatus,
    )),
    tags(
        (name = "weather", description = "Cached, de-duplicated weather lookups"),
    ),
)]
struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
