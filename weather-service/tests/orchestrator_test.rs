mod support;

use common::errors::AppError;
use common::models::{Coordinates, FetchStatus, WeatherTarget};
use common::open_meteo::OpenMeteoClient;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{Reply, StubWeather, fast_config, harness, harness_with_cooldown, snapshot};
use tokio::task::JoinSet;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn target(name: &str, lat: f64, lng: f64) -> WeatherTarget {
    WeatherTarget {
        name: name.to_string(),
        lat,
        lng,
    }
}

fn mumbai() -> Coordinates {
    Coordinates::new(19.076, 72.8777)
}

#[tokio::test]
async fn test_cached_entry_skips_network() {
    let upstream = StubWeather::new(vec![]);
    let h = harness(upstream.clone(), fast_config());

    h.orchestrator
        .cache()
        .set(mumbai().key(), snapshot(31.0))
        .await;

    let weather = h.orchestrator.get_weather(mumbai()).await.unwrap();
    assert_eq!(weather.temperature, 31.0);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let upstream = StubWeather::with_delay(vec![Reply::Ok(28.0)], Duration::from_millis(100));
    let h = harness(upstream.clone(), fast_config());

    // Near-duplicate coordinates collapse onto the same key
    let (a, b) = tokio::join!(
        h.orchestrator.get_weather(mumbai()),
        h.orchestrator
            .get_weather(Coordinates::new(19.07603, 72.87768))
    );

    assert_eq!(a.unwrap().temperature, 28.0);
    assert_eq!(b.unwrap().temperature, 28.0);
    assert_eq!(upstream.calls(), 1);

    // And the next call is served from cache
    h.orchestrator.get_weather(mumbai()).await.unwrap();
    assert_eq!(upstream.calls(), 1);
    assert!(h.orchestrator.pending().is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_staggered_callers_never_refetch_cached_key() {
    let upstream = StubWeather::with_delay(vec![Reply::Ok(28.0)], Duration::from_millis(30));
    let h = harness(upstream.clone(), fast_config());

    // Arrivals straddle the moment the owner stores and releases the key
    let mut callers = JoinSet::new();
    for i in 0..64u64 {
        let orchestrator = h.orchestrator.clone();
        callers.spawn(async move {
            tokio::time::sleep(Duration::from_millis(i % 16 * 3)).await;
            orchestrator.get_weather(mumbai()).await
        });
    }

    while let Some(joined) = callers.join_next().await {
        assert_eq!(joined.unwrap().unwrap().temperature, 28.0);
    }
    assert_eq!(upstream.calls(), 1);
    assert!(h.orchestrator.pending().is_empty().await);
}

#[tokio::test]
async fn test_owner_failure_releases_one_waiter_at_a_time() {
    let upstream = StubWeather::with_delay(vec![Reply::ServerError; 5], Duration::from_millis(100));
    let h = harness(upstream.clone(), fast_config());

    let mut callers = JoinSet::new();
    for _ in 0..5 {
        let orchestrator = h.orchestrator.clone();
        callers.spawn(async move { orchestrator.get_weather(mumbai()).await });
    }

    while let Some(joined) = callers.join_next().await {
        let err = joined.unwrap().unwrap_err();
        assert!(matches!(err, AppError::UpstreamError { status: 500, .. }));
    }
    // Each caller retried in turn, never two at once
    assert_eq!(upstream.calls(), 5);
    assert_eq!(upstream.peak_in_flight(), 1);
    assert!(h.orchestrator.pending().is_empty().await);
}

#[tokio::test]
async fn test_rate_limit_fails_fast_until_cooldown_expires() {
    let upstream = StubWeather::new(vec![Reply::RateLimited, Reply::Ok(22.0)]);
    let h = harness_with_cooldown(upstream.clone(), fast_config(), Duration::from_millis(200));

    let err = h.orchestrator.get_weather(mumbai()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(upstream.calls(), 1);

    // Inside the cool-down: no network at all, for any key
    let err = h.orchestrator.get_weather(mumbai()).await.unwrap_err();
    assert!(err.is_rate_limited());
    let err = h
        .orchestrator
        .get_weather(Coordinates::new(35.6762, 139.6503))
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(upstream.calls(), 1);
    assert!(h.orchestrator.pending().is_empty().await);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let weather = h.orchestrator.get_weather(mumbai()).await.unwrap();
    assert_eq!(weather.temperature, 22.0);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_waiter_observes_rate_limit() {
    let upstream = StubWeather::with_delay(vec![Reply::RateLimited], Duration::from_millis(80));
    let h = harness(upstream.clone(), fast_config());

    let (a, b) = tokio::join!(
        h.orchestrator.get_weather(mumbai()),
        h.orchestrator.get_weather(mumbai())
    );

    assert!(a.unwrap_err().is_rate_limited());
    assert!(b.unwrap_err().is_rate_limited());
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_bounded_wait_allows_duplicate_fetch() {
    let upstream = StubWeather::with_delay(vec![], Duration::from_millis(300));
    let mut config = fast_config();
    config.poll_attempts = 5;
    let h = harness(upstream.clone(), config);

    let (a, b) = tokio::join!(
        h.orchestrator.get_weather(mumbai()),
        h.orchestrator.get_weather(mumbai())
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    // The waiter gave up after ~50ms and fetched itself
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_timeout_is_not_retried() {
    let upstream = StubWeather::with_delay(vec![], Duration::from_millis(500));
    let mut config = fast_config();
    config.request_timeout = Duration::from_millis(50);
    let h = harness(upstream.clone(), config);

    let err = h.orchestrator.get_weather(mumbai()).await.unwrap_err();
    assert!(matches!(err, AppError::TimeoutError(_)));
    assert_eq!(upstream.calls(), 1);
    assert!(h.orchestrator.pending().is_empty().await);
    assert!(!h.orchestrator.rate_limit().is_limited().await);
}

#[tokio::test]
async fn test_upstream_error_does_not_trigger_cooldown() {
    let upstream = StubWeather::new(vec![Reply::ServerError]);
    let h = harness(upstream.clone(), fast_config());

    let err = h.orchestrator.get_weather(mumbai()).await.unwrap_err();
    assert!(matches!(err, AppError::UpstreamError { status: 500, .. }));
    assert!(!h.orchestrator.rate_limit().is_limited().await);

    // The next call is free to try again
    assert!(h.orchestrator.get_weather(mumbai()).await.is_ok());
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_invalid_coordinates_rejected_without_fetch() {
    let upstream = StubWeather::new(vec![]);
    let h = harness(upstream.clone(), fast_config());

    let err = h
        .orchestrator
        .get_weather(Coordinates::new(123.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_batch_abandons_remaining_after_rate_limit() {
    let upstream = StubWeather::new(vec![Reply::Ok(28.0), Reply::RateLimited]);
    let h = harness(upstream.clone(), fast_config());

    let response = h
        .orchestrator
        .get_weather_batch(vec![
            target("Mumbai", 19.076, 72.8777),
            target("Delhi", 28.6139, 77.209),
            target("Chennai", 13.0827, 80.2707),
        ])
        .await
        .unwrap();

    assert_eq!(upstream.calls(), 2);
    let statuses: Vec<_> = response.cities.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            FetchStatus::Fresh,
            FetchStatus::RateLimited,
            FetchStatus::RateLimited
        ]
    );
    assert_eq!(response.cities[0].weather.as_ref().unwrap().temperature, 28.0);
    assert!(response.cities[2].weather.is_none());
    assert_eq!(response.summary.total, 3);
    assert_eq!(response.summary.successful, 1);
    assert_eq!(response.summary.rate_limited, 2);
    assert_eq!(response.summary.failed, 0);
}

#[tokio::test]
async fn test_batch_spaces_upstream_calls() {
    let upstream = StubWeather::new(vec![]);
    let mut config = fast_config();
    config.inter_request_delay = Duration::from_millis(100);
    let h = harness(upstream.clone(), config);

    h.orchestrator
        .get_weather_batch(vec![
            target("Paris", 48.8566, 2.3522),
            target("Berlin", 52.52, 13.405),
        ])
        .await
        .unwrap();

    let times = upstream.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1].duration_since(times[0]) >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_batch_serves_cache_hits_without_delay() {
    let upstream = StubWeather::new(vec![]);
    let mut config = fast_config();
    config.inter_request_delay = Duration::from_secs(2);
    let h = harness(upstream.clone(), config);

    h.orchestrator
        .cache()
        .set(Coordinates::new(48.8566, 2.3522).key(), snapshot(9.0))
        .await;

    let started = Instant::now();
    let response = h
        .orchestrator
        .get_weather_batch(vec![
            target("Cairo", 30.0444, 31.2357),
            target("Paris", 48.8566, 2.3522),
            target("Nowhere", 200.0, 0.0),
        ])
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(upstream.calls(), 1);
    assert_eq!(response.cities[0].status, FetchStatus::Fresh);
    assert_eq!(response.cities[1].status, FetchStatus::Cached);
    assert_eq!(response.cities[2].status, FetchStatus::Unavailable);
    assert_eq!(response.summary.failed, 1);
}

#[tokio::test]
async fn test_batch_caps_target_list() {
    let upstream = StubWeather::new(vec![]);
    let mut config = fast_config();
    config.max_targets = 2;
    let h = harness(upstream.clone(), config);

    let response = h
        .orchestrator
        .get_weather_batch(vec![
            target("London", 51.5074, -0.1278),
            target("Tokyo", 35.6762, 139.6503),
            target("Sydney", -33.8688, 151.2093),
            target("Cairo", 30.0444, 31.2357),
        ])
        .await
        .unwrap();

    assert_eq!(response.cities.len(), 2);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let h = harness(StubWeather::new(vec![]), fast_config());
    let err = h.orchestrator.get_weather_batch(vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

/// End to end against a mock Open-Meteo: two quick calls, one request
#[tokio::test]
async fn test_open_meteo_dedup_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "current": {
                        "temperature_2m": 28.0,
                        "relative_humidity_2m": 70.0,
                        "wind_speed_10m": 12.0,
                        "weather_code": 1
                    }
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let upstream = Arc::new(OpenMeteoClient::new(
        format!("{}/v1/forecast", mock_server.uri()),
        Duration::from_secs(2),
    ));
    let h = harness(upstream, fast_config());

    let (a, b) = tokio::join!(
        h.orchestrator.get_weather(mumbai()),
        h.orchestrator.get_weather(mumbai())
    );
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a.humidity, Some(70.0));

    h.orchestrator.get_weather(mumbai()).await.unwrap();
}

#[tokio::test]
async fn test_open_meteo_429_starts_cooldown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upstream = Arc::new(OpenMeteoClient::new(
        format!("{}/v1/forecast", mock_server.uri()),
        Duration::from_secs(2),
    ));
    let h = harness(upstream, fast_config());

    assert!(h.orchestrator.get_weather(mumbai()).await.unwrap_err().is_rate_limited());
    assert!(h.orchestrator.get_weather(mumbai()).await.unwrap_err().is_rate_limited());
    assert!(h.orchestrator.rate_limit().is_limited().await);
}
