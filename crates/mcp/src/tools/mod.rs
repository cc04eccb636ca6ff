mod flashcards;
mod registry;

pub use flashcards::{
    success_message, CreateFlashcards, CreateFlashcardsInput, INVALID_CREDENTIAL_MESSAGE,
    ITEM_COUNT_EXCEEDED_MESSAGE, MAX_SOURCE_LENGTH, QUOTA_EXCEEDED_MESSAGE, RATE_LIMITED_MESSAGE,
};
pub use registry::{PreparedCall, Tool, ToolDescriptor, ToolId, ToolRegistry};
