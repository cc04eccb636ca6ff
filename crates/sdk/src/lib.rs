//! # Rember SDK
//!
//! Rust client for the Rember API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rember_sdk::{Note, Notes, RemberClient, RemberResult};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> RemberResult<()> {
//!     let client = RemberClient::builder()
//!         .api_key("rember_0123456789abcdef0123456789abcdef")
//!         .build()?;
//!
//!     let notes = Notes::new(vec![Note::new("Paris is the capital of France")])?;
//!     let submission = client
//!         .rembs()
//!         .generate_cards_and_create_rembs(&notes, &CancellationToken::new())
//!         .await?;
//!     println!("Created {} rembs", submission.quantity);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-export main client
pub use client::{RemberClient, RemberClientBuilder};
pub use config::{ClientConfig, RetryConfig, DEFAULT_BASE_URL, DEFAULT_SOURCE};
pub use error::{RemberError, RemberResult};

// Re-export core types for convenience
pub use rember_core::{
    ApiKey, DomainError, DomainErrorKind, FlashcardBackend, Note, Notes, Submission, SubmitError,
};
