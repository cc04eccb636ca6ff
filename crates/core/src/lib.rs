// Core types shared by the Rember backend client and the MCP server

pub mod backend;
pub mod error;
pub mod types;

pub use backend::FlashcardBackend;
pub use error::{DomainError, DomainErrorKind, InvalidApiKey, NotesError, SubmitError};
pub use types::*;
