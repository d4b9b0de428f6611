use common::open_meteo::DEFAULT_OPEN_METEO_URL;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;

pub struct Config {
    pub port: u16,
    pub open_meteo_url: String,
    pub cache_ttl_seconds: u64,
    pub rate_limit_cooldown_seconds: u64,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
    pub inter_request_delay_ms: u64,
    pub max_startup_jitter_ms: u64,
    pub max_targets: usize,
    pub pending_timeout_seconds: u64,
    pub pending_sweep_interval_seconds: u64,
    pub storage_dir: Option<PathBuf>,
    pub storage_origin: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: parse_or("PORT", 3002),
            open_meteo_url: env::var("OPEN_METEO_URL")
                .unwrap_or_else(|_| DEFAULT_OPEN_METEO_URL.to_string()),
            cache_ttl_seconds: parse_or("CACHE_TTL_SECONDS", 1800), // 30 minutes
            rate_limit_cooldown_seconds: parse_or("RATE_LIMIT_COOLDOWN_SECONDS", 300),
            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 10_000),
            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 200),
            poll_attempts: parse_or("POLL_ATTEMPTS", 25),
            inter_request_delay_ms: parse_or("INTER_REQUEST_DELAY_MS", 3_000),
            max_startup_jitter_ms: parse_or("MAX_STARTUP_JITTER_MS", 1_500),
            max_targets: parse_or("MAX_TARGETS", 5),
            pending_timeout_seconds: parse_or("PENDING_TIMEOUT_SECONDS", 30),
            pending_sweep_interval_seconds: parse_or("PENDING_SWEEP_INTERVAL_SECONDS", 10),
            storage_dir: env::var("STORAGE_DIR").ok().map(PathBuf::from),
            storage_origin: env::var("STORAGE_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_seconds)
    }

    pub fn pending_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sweep_interval_seconds.max(1))
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            request_timeout: self.request_timeout(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_attempts: self.poll_attempts,
            inter_request_delay: Duration::from_millis(self.inter_request_delay_ms),
            max_startup_jitter: Duration::from_millis(self.max_startup_jitter_ms),
            max_targets: self.max_targets.max(1),
        }
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
