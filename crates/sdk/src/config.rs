//! Configuration types for the Rember SDK.

use crate::error::RemberError;
use rember_core::ApiKey;
use std::time::Duration;
use url::Url;

/// Default base URL of the Rember API.
pub const DEFAULT_BASE_URL: &str = "https://www.rember.com/";

/// Default value of the `x-source` header.
pub const DEFAULT_SOURCE: &str = "rember-mcp";

/// Configuration for the Rember client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Rember API.
    pub base_url: Url,
    /// API key sent with every request.
    pub api_key: ApiKey,
    /// Identifies the integration issuing the requests.
    pub source: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL and API key.
    pub fn new(base_url: Url, api_key: ApiKey) -> Self {
        Self {
            base_url,
            api_key,
            source: DEFAULT_SOURCE.to_string(),
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
        }
    }
}

/// Configuration for retry behavior on transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// HTTP status codes to retry on.
    pub retry_on_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_on_status_codes: vec![500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        std::cmp::min(backoff, self.max_backoff)
    }

    /// Check if a failed request should be sent again.
    ///
    /// Only timeouts, connection failures and the configured statuses are
    /// transient. Domain errors, such as rate limiting, never are.
    pub fn should_retry(&self, error: &RemberError) -> bool {
        match error {
            RemberError::Http(e) => e.is_timeout() || e.is_connect(),
            RemberError::Api { status, .. } => self.retry_on_status_codes.contains(status),
            _ => false,
        }
    }
}
