pub mod errors;
pub mod geocoding;
pub mod http_client;
pub mod models;
pub mod open_meteo;
pub mod tracing;
pub mod upstream;
