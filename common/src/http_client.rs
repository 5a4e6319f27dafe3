use crate::errors::AppError;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Total attempts made by `fetch_with_retry` before giving up.
pub const MAX_RETRIES: u32 = 3;

/// Per-request timeout applied to every upstream call.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Pooled HTTP client for upstream data providers.
///
/// One instance is shared process-wide so every outbound call reuses the
/// same connection pool instead of opening a fresh connection per request.
pub struct UpstreamClient {
    client: Client,
    max_retries: u32,
    timeout: Duration,
    backoff_base: Duration,
}

impl UpstreamClient {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(20)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            max_retries,
            timeout: Duration::from_secs(timeout_secs),
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Overrides the first backoff wait; attempt `n` then waits `base * 2^n`.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        // saturate so an oversized MAX_RETRIES knob cannot overflow
        self.backoff_base.saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// GET `url`, retrying transport failures and non-2xx statuses with
    /// exponential backoff.
    ///
    /// Exhausting every attempt surfaces as `ServiceUnavailable` naming the
    /// URL; the per-attempt causes are only logged.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_with_retry(&self, url: &str) -> Result<Response, AppError> {
        for attempt in 0..self.max_retries {
            match self.try_fetch(url).await {
                Ok(response) => {
                    info!(attempt = attempt + 1, "Request successful");
                    return Ok(response);
                }
                Err(e) => {
                    if attempt + 1 < self.max_retries {
                        let backoff = self.backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis(),
                            error = %e,
                            "Request failed, retrying with exponential backoff"
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        error!(
                            attempts = self.max_retries,
                            error = %e,
                            "All retry attempts exhausted"
                        );
                    }
                }
            }
        }

        Err(AppError::service_unavailable(format!(
            "Error fetching data from {url}"
        )))
    }

    /// Single-attempt GET for call sites that branch on specific status
    /// codes instead of retrying them.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, AppError> {
        self.send(url).await
    }

    /// Fetches with retry and decodes the response body as JSON.
    pub async fn get_json<T>(&self, url: &str) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.fetch_with_retry(url).await?;
        let text = response.text().await.map_err(AppError::Network)?;
        let json: T = serde_json::from_str(&text).map_err(AppError::Parse)?;

        Ok(json)
    }

    async fn try_fetch(&self, url: &str) -> Result<Response, AppError> {
        let response = self.send(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::http(
                status.as_u16(),
                format!("HTTP error: {}", status),
            ));
        }

        Ok(response)
    }

    async fn send(&self, url: &str) -> Result<Response, AppError> {
        tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| AppError::timeout(format!("Request to {} timed out", url)))?
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout(format!("Request to {} timed out", url))
                } else {
                    AppError::Network(e)
                }
            })
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT_SECS, MAX_RETRIES)
    }
}
