//! Main client for the Rember SDK.

use crate::api::RembsApi;
use crate::config::{ClientConfig, RetryConfig, DEFAULT_BASE_URL, DEFAULT_SOURCE};
use crate::error::{RemberError, RemberResult};
use crate::transport::HttpTransport;
use rember_core::{ApiKey, FlashcardBackend, Notes, Submission, SubmitError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Main client for interacting with the Rember API.
#[derive(Debug, Clone)]
pub struct RemberClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl RemberClient {
    /// Create a new client builder.
    pub fn builder() -> RemberClientBuilder {
        RemberClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ClientConfig) -> RemberResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the rembs API.
    pub fn rembs(&self) -> RembsApi<'_> {
        RembsApi::new(self)
    }
}

#[async_trait::async_trait]
impl FlashcardBackend for RemberClient {
    async fn submit(
        &self,
        notes: &Notes,
        cancel: &CancellationToken,
    ) -> Result<Submission, SubmitError> {
        self.rembs()
            .generate_cards_and_create_rembs(notes, cancel)
            .await
            .map_err(SubmitError::from)
    }
}

/// Builder for creating a RemberClient.
pub struct RemberClientBuilder {
    base_url: String,
    api_key: Option<String>,
    source: String,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl RemberClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            source: DEFAULT_SOURCE.to_string(),
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the base URL of the Rember API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the value of the `x-source` header.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> RemberResult<RemberClient> {
        let api_key = self
            .api_key
            .ok_or_else(|| RemberError::Config("api_key is required".to_string()))?;
        let api_key = ApiKey::parse(api_key).map_err(|e| RemberError::Config(e.to_string()))?;

        let base_url = Url::parse(&self.base_url)?;

        let config = ClientConfig {
            base_url,
            api_key,
            source: self.source,
            timeout: self.timeout,
            retry_config: self.retry_config,
        };

        RemberClient::from_config(config)
    }
}

impl Default for RemberClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
