//! HTTP transport layer for the Rember SDK.

use crate::config::ClientConfig;
use crate::error::{RemberError, RemberResult};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// HTTP transport for making API requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> RemberResult<Self> {
        let mut headers = header::HeaderMap::new();

        let mut api_key = header::HeaderValue::from_str(config.api_key.expose())
            .map_err(|_| RemberError::Config("Invalid API key format".to_string()))?;
        api_key.set_sensitive(true);
        headers.insert(header::HeaderName::from_static("x-api-key"), api_key);

        headers.insert(
            header::HeaderName::from_static("x-source"),
            header::HeaderValue::from_str(&config.source)
                .map_err(|_| RemberError::Config("Invalid source format".to_string()))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build a URL for the given path.
    fn build_url(&self, path: &str) -> RemberResult<url::Url> {
        Ok(self.config.base_url.join(path)?)
    }

    /// Sleep before the next attempt, unless the caller cancels first.
    async fn backoff(&self, backoff: Duration, cancel: &CancellationToken) -> RemberResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemberError::Cancelled),
            _ = tokio::time::sleep(backoff) => Ok(()),
        }
    }

    /// Execute a request, retrying transient failures.
    async fn execute_with_retry(
        &self,
        request_builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> RemberResult<Response> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let request = request_builder
                .try_clone()
                .ok_or_else(|| RemberError::Config("Request cannot be cloned".to_string()))?;

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemberError::Cancelled),
                sent = request.send() => sent,
            };

            let error = match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RemberError::Cancelled),
                        body = response.text() => body.unwrap_or_default(),
                    };
                    RemberError::from_response(status, &body)
                }
                Err(e) => RemberError::from(e),
            };

            if attempts >= retry_config.max_retries || !retry_config.should_retry(&error) {
                return Err(error);
            }

            let backoff = retry_config.backoff_for_attempt(attempts);
            warn!(
                attempt = attempts + 1,
                backoff_ms = backoff.as_millis(),
                error = %error,
                "Request failed, retrying"
            );
            self.backoff(backoff, cancel).await?;
            attempts += 1;
        }
    }

    /// Execute a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> RemberResult<T> {
        let url = self.build_url(path)?;
        debug!(url = %url, "POST request");

        let response = self
            .execute_with_retry(self.client.post(url).json(body), cancel)
            .await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemberError::Cancelled),
            body = response.json::<T>() => Ok(body?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use rember_core::{ApiKey, DomainErrorKind};
    use serde::{Deserialize, Serialize};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API_KEY: &str = "rember_0123456789abcdef0123456789abcdef";

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestResponse {
        message: String,
        value: i32,
    }

    #[derive(Debug, Serialize)]
    struct TestRequest {
        name: String,
    }

    fn create_config(base_url: &str, retry_config: RetryConfig) -> Arc<ClientConfig> {
        let mut config = ClientConfig::new(
            url::Url::parse(base_url).unwrap(),
            ApiKey::parse(API_KEY).unwrap(),
        );
        config.retry_config = retry_config;
        Arc::new(config)
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn request() -> TestRequest {
        TestRequest {
            name: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_post_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestResponse {
                message: "created".to_string(),
                value: 1,
            }))
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(create_config(&server.uri(), RetryConfig::no_retry())).unwrap();

        let result: TestResponse = transport
            .post("/api/create", &request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.message, "created");
    }

    #[tokio::test]
    async fn test_identity_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/protected"))
            .and(header("x-api-key", API_KEY))
            .and(header("x-source", "rember-mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestResponse {
                message: "authorized".to_string(),
                value: 100,
            }))
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(create_config(&server.uri(), RetryConfig::no_retry())).unwrap();

        let result: TestResponse = transport
            .post("/api/protected", &request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.message, "authorized");
    }

    #[tokio::test]
    async fn test_domain_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/limited"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "_tag": "Api/ReachedLimitRateLimiter",
                "message": "Too many requests"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let result: RemberResult<TestResponse> = transport
            .post("/api/limited", &request(), &CancellationToken::new())
            .await;
        match result {
            Err(RemberError::Domain(e)) => {
                assert_eq!(e.kind, DomainErrorKind::RateLimited);
                assert_eq!(e.message, "Too many requests");
            }
            other => panic!("Expected domain error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(TestResponse {
                message: "recovered".to_string(),
                value: 3,
            }))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let result: TestResponse = transport
            .post("/api/flaky", &request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.message, "recovered");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/down"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(4)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri(), fast_retry())).unwrap();

        let result: RemberResult<TestResponse> = transport
            .post("/api/down", &request(), &CancellationToken::new())
            .await;
        match result {
            Err(RemberError::Api { status, .. }) => assert_eq!(status, 500),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(TestResponse {
                        message: "late".to_string(),
                        value: 0,
                    })
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(create_config(&server.uri(), RetryConfig::no_retry())).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let result: RemberResult<TestResponse> =
            transport.post("/api/slow", &request(), &cancel).await;

        assert!(matches!(result, Err(RemberError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_build_url_with_trailing_slash() {
        let transport = HttpTransport::new(create_config(
            "http://localhost:8080/",
            RetryConfig::no_retry(),
        ))
        .unwrap();

        let url = transport
            .build_url("api/v1/generate-cards-and-create-rembs")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/v1/generate-cards-and-create-rembs"
        );
    }
}
