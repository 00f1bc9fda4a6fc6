//! HTTP byte source using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    source::ByteSource,
};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for remote fetches
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.use_exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor).min(self.max_delay)
        } else {
            self.base_delay
        }
    }
}

/// Reqwest-based byte source for `http://` and `https://` locators
///
/// Server errors (5xx) and rate limiting (429) are retried with backoff.
/// A 404 maps to [`BridgeError::NotFound`]; other client errors fail at once.
pub struct HttpByteSource {
    client: Client,
    policy: RetryPolicy,
}

impl HttpByteSource {
    /// Create a source with a 30 second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("multitrek/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Bytes> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.policy.max_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                url = %url,
                "Fetching remote audio"
            );

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if status >= 500 || status == 429 {
                        warn!(status, attempt = attempt + 1, "Fetch failed with retryable status");
                        last_error = Some(BridgeError::OperationFailed(format!(
                            "HTTP {} error",
                            status
                        )));
                    } else if status == 404 {
                        return Err(BridgeError::NotFound(url.to_string()));
                    } else if status >= 400 {
                        return Err(BridgeError::OperationFailed(format!(
                            "HTTP {} error fetching {}",
                            status, url
                        )));
                    } else {
                        return response
                            .bytes()
                            .await
                            .map_err(|e| BridgeError::OperationFailed(e.to_string()));
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "Fetch request failed");

                    last_error = Some(if e.is_timeout() {
                        BridgeError::OperationFailed("Request timed out".to_string())
                    } else if e.is_connect() {
                        BridgeError::OperationFailed(format!("Connection failed: {}", e))
                    } else {
                        BridgeError::OperationFailed(e.to_string())
                    });
                }
            }

            attempt += 1;

            if attempt < self.policy.max_attempts {
                let delay = self.policy.delay_after(attempt);
                debug!(delay_ms = delay.as_millis(), "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        self.fetch_with_retry(locator).await
    }

    fn handles(&self, locator: &str) -> bool {
        is_http_locator(locator)
    }
}

pub(crate) fn is_http_locator(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}
