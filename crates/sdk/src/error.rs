//! Error types for the Rember SDK.

use rember_core::{DomainError, NotesError, SubmitError};
use serde::{Deserialize, Serialize};

/// Result type for SDK operations.
pub type RemberResult<T> = Result<T, RemberError>;

/// Error types that can occur when using the Rember SDK.
#[derive(Debug, thiserror::Error)]
pub enum RemberError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the request for a known, non-transient reason.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// API returned an unexpected error response.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<String>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The notes do not fit the payload limits.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] NotesError),

    /// The caller cancelled the request.
    #[error("Request was cancelled")]
    Cancelled,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RemberError {
    /// Create an error from a non-success status code and response body.
    ///
    /// Statuses with a documented meaning become [`DomainError`]s, everything
    /// else is kept as a generic API error.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.error.clone()))
            .unwrap_or_else(|| body.to_string());

        match status {
            401 => Self::Domain(DomainError::invalid_credential(message)),
            400 => Self::Domain(DomainError::item_count_exceeded(message)),
            403 => Self::Domain(DomainError::quota_exceeded(message)),
            429 => Self::Domain(DomainError::rate_limited(message)),
            _ => Self::Api {
                status,
                message,
                details: parsed.and_then(|e| e.tag),
            },
        }
    }
}

impl From<RemberError> for SubmitError {
    fn from(error: RemberError) -> Self {
        match error {
            RemberError::Domain(e) => SubmitError::Domain(e),
            RemberError::Cancelled => SubmitError::Cancelled,
            RemberError::InvalidInput(e) => {
                SubmitError::Domain(DomainError::item_count_exceeded(e.to_string()))
            }
            other => SubmitError::Transient(other.to_string()),
        }
    }
}

/// Error response from the Rember API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "_tag", skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rember_core::DomainErrorKind;

    fn domain_kind(error: &RemberError) -> Option<DomainErrorKind> {
        match error {
            RemberError::Domain(e) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            domain_kind(&RemberError::from_response(401, "")),
            Some(DomainErrorKind::InvalidCredential)
        );
        assert_eq!(
            domain_kind(&RemberError::from_response(400, "")),
            Some(DomainErrorKind::ItemCountExceeded)
        );
        assert_eq!(
            domain_kind(&RemberError::from_response(403, "")),
            Some(DomainErrorKind::QuotaExceeded)
        );
        assert_eq!(
            domain_kind(&RemberError::from_response(429, "")),
            Some(DomainErrorKind::RateLimited)
        );
        assert_eq!(domain_kind(&RemberError::from_response(500, "")), None);
    }

    #[test]
    fn test_message_from_tagged_body() {
        let body = r#"{"_tag":"Api/ReachedLimitUsageTracker","message":"Usage limit reached: 30/30"}"#;
        let error = RemberError::from_response(403, body);
        assert_eq!(error.to_string(), "Usage limit reached: 30/30");
    }

    #[test]
    fn test_message_from_plain_body() {
        let error = RemberError::from_response(502, "Bad Gateway");
        match error {
            RemberError::Api { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_into_submit_error() {
        let submit: SubmitError = RemberError::from_response(403, "limit").into();
        assert_eq!(submit.domain_kind(), Some(DomainErrorKind::QuotaExceeded));

        let submit: SubmitError = RemberError::Cancelled.into();
        assert_eq!(submit, SubmitError::Cancelled);

        let submit: SubmitError = RemberError::from_response(500, "oops").into();
        assert!(matches!(submit, SubmitError::Transient(_)));
    }
}
