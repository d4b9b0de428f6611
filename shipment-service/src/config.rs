use common::geocoding::{DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT};
use common::open_meteo::DEFAULT_OPEN_METEO_URL;
use std::env;
use std::time::Duration;

use crate::pipeline::PipelineConfig;

pub struct Config {
    pub port: u16,
    pub open_meteo_url: String,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub request_timeout_ms: u64,
    pub inter_stage_delay_ms: u64,
    pub inter_place_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3004),
            open_meteo_url: env::var("OPEN_METEO_URL")
                .unwrap_or_else(|_| DEFAULT_OPEN_METEO_URL.to_string()),
            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| DEFAULT_NOMINATIM_URL.to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(10_000),
            inter_stage_delay_ms: env::var("INTER_STAGE_DELAY_MS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(1_100), // geocoder allows one request per second
            inter_place_delay_ms: env::var("INTER_PLACE_DELAY_MS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(1_500),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn inter_place_delay(&self) -> Duration {
        Duration::from_millis(self.inter_place_delay_ms)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            request_timeout: self.request_timeout(),
            inter_stage_delay: Duration::from_millis(self.inter_stage_delay_ms),
        }
    }
}
