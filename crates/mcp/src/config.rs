use crate::policy::ExecutionPolicy;
use crate::protocol::ServerInfo;
use anyhow::{Context, Result};
use rember_core::ApiKey;
use rember_sdk::{RemberClient, RetryConfig, DEFAULT_BASE_URL, DEFAULT_SOURCE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "REMBER_API_KEY";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing API key: pass --api-key or set REMBER_API_KEY")]
    MissingApiKey,

    #[error(transparent)]
    InvalidApiKey(#[from] rember_core::InvalidApiKey),
}

/// Validate the API key given on the command line or in the environment.
pub fn resolve_api_key(value: Option<String>) -> Result<ApiKey, ConfigError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingApiKey)?;
    Ok(ApiKey::parse(value)?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_version")]
    pub version: String,
}

fn default_server_name() -> String {
    "rember-mcp".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            source: default_source(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl McpConfig {
    /// Load the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read configuration file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse configuration file")?;

        if config.policy.max_attempts == 0 {
            anyhow::bail!("policy.max_attempts must be at least 1");
        }
        Ok(config)
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server.name.clone(),
            version: self.server.version.clone(),
        }
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            max_attempts: self.policy.max_attempts,
            base_delay: Duration::from_millis(self.policy.base_delay_ms),
            timeout: Duration::from_secs(self.policy.timeout_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.backend.max_retries,
            initial_backoff: Duration::from_millis(self.backend.initial_backoff_ms),
            backoff_multiplier: self.backend.backoff_multiplier,
            ..Default::default()
        }
    }

    /// Build the Rember API client described by the `[backend]` section.
    pub fn client(&self, api_key: &ApiKey) -> Result<RemberClient> {
        RemberClient::builder()
            .base_url(&self.backend.base_url)
            .api_key(api_key.expose())
            .source(&self.backend.source)
            .timeout(Duration::from_secs(self.backend.request_timeout_secs))
            .retry_config(self.retry_config())
            .build()
            .context("Failed to create Rember client")
    }
}
