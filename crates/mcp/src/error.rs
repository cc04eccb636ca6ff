// Error types for tool handlers and the protocol bridge

use crate::schema::EncodingError;
use rember_core::{DomainError, SubmitError};

/// Failure reported by a tool handler for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// A typed backend failure; never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failure of unknown cause; retried by the execution policy.
    #[error("{0}")]
    Transient(String),

    /// The handler knows retrying cannot help.
    #[error("{0}")]
    Rejected(String),

    /// The handler panicked.
    #[error("Tool handler panicked: {0}")]
    Panicked(String),

    /// The handler observed cancellation and stopped.
    #[error("The tool call was interrupted")]
    Cancelled,
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<SubmitError> for ToolError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Domain(e) => Self::Domain(e),
            SubmitError::Transient(message) => Self::Transient(message),
            SubmitError::Cancelled => Self::Cancelled,
        }
    }
}

/// A tool registration that breaks a registry invariant. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),

    #[error("tool tag '{0}' does not map to a unique wire name")]
    NotRoundTrip(String),

    #[error("tool '{0}' must declare a text success schema")]
    NonTextOutput(String),
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A handler produced a success value its declared schema cannot encode.
    #[error("failed to encode result of tool '{tool}': {source}")]
    Encoding {
        tool: String,
        #[source]
        source: EncodingError,
    },

    #[error("tool task failed: {0}")]
    Task(String),
}
