//! Domain errors shared by the backend client and the tool handlers.

use serde::{Deserialize, Serialize};

/// The API key does not match `rember_[a-f0-9]{32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid API key: expected 'rember_' followed by 32 lowercase hex characters")]
pub struct InvalidApiKey;

/// A list of notes violates the payload limits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotesError {
    #[error("too many notes: {count} (maximum {max})")]
    TooMany { count: usize, max: usize },

    #[error("note {index} is {length} characters long (maximum {max})")]
    TooLong {
        index: usize,
        length: usize,
        max: usize,
    },
}

/// Classification of the failures the backend reports on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainErrorKind {
    /// The API key was rejected
    InvalidCredential,
    /// Monthly usage limit reached
    QuotaExceeded,
    /// Too many requests in a short period
    RateLimited,
    /// Too many items in a single request
    ItemCountExceeded,
}

impl DomainErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::ItemCountExceeded => "item_count_exceeded",
        }
    }
}

impl std::fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure produced by the backend. Retrying cannot change it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DomainError {
    pub kind: DomainErrorKind,
    pub message: String,
}

impl DomainError {
    pub fn new(kind: DomainErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::InvalidCredential, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::QuotaExceeded, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::RateLimited, message)
    }

    pub fn item_count_exceeded(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::ItemCountExceeded, message)
    }
}

/// Failure of [`FlashcardBackend::submit`](crate::backend::FlashcardBackend::submit).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Network or server failure of unknown cause, safe to retry.
    #[error("{0}")]
    Transient(String),

    #[error("Request was cancelled")]
    Cancelled,
}

impl SubmitError {
    pub fn domain_kind(&self) -> Option<DomainErrorKind> {
        match self {
            Self::Domain(e) => Some(e.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display_is_message() {
        let err = DomainError::quota_exceeded("Usage limit reached for feature 'generateCards': 30/30");
        assert_eq!(
            err.to_string(),
            "Usage limit reached for feature 'generateCards': 30/30"
        );
        assert_eq!(err.kind, DomainErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_submit_error_domain_kind() {
        let err: SubmitError = DomainError::rate_limited("slow down").into();
        assert_eq!(err.domain_kind(), Some(DomainErrorKind::RateLimited));
        assert_eq!(SubmitError::Cancelled.domain_kind(), None);
        assert_eq!(SubmitError::Transient("boom".into()).domain_kind(), None);
    }
}
