use crate::errors::AppError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// HTTP client with a hard timeout and no retries.
///
/// The free upstream tiers punish bursts, so a failed request is reported to
/// the caller as-is; a `429` becomes [`AppError::RateLimited`].
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self::build(timeout, None)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Self {
        Self::build(timeout, Some(user_agent))
    }

    fn build(timeout: Duration, user_agent: Option<&str>) -> Self {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        let client = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            Client::new()
        });

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch JSON from URL, mapping status codes onto the error taxonomy
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json<T>(&self, url: &str) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| AppError::timeout(format!("Request to {} timed out", url)))?
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout(format!("Request to {} timed out", url))
                } else {
                    AppError::NetworkError(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "Upstream signalled too many requests");
            return Err(AppError::rate_limited(format!(
                "Upstream refused {} with 429",
                url
            )));
        }
        if !status.is_success() {
            return Err(AppError::upstream(
                status.as_u16(),
                format!("HTTP error: {}", status),
            ));
        }

        let text = response.text().await.map_err(AppError::NetworkError)?;
        let json: T = serde_json::from_str(&text).map_err(AppError::ParseError)?;

        debug!(url = %url, "Request successful");
        Ok(json)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
