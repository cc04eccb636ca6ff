use crate::error::SubmitError;
use crate::types::{Notes, Submission};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns validated notes into rembs on the remote service.
///
/// Implementations must be safe to call again after a transient failure and
/// should stop their own I/O as soon as `cancel` fires.
#[async_trait::async_trait]
pub trait FlashcardBackend: Send + Sync {
    async fn submit(
        &self,
        notes: &Notes,
        cancel: &CancellationToken,
    ) -> Result<Submission, SubmitError>;
}

#[async_trait::async_trait]
impl<T: FlashcardBackend + ?Sized> FlashcardBackend for Arc<T> {
    async fn submit(
        &self,
        notes: &Notes,
        cancel: &CancellationToken,
    ) -> Result<Submission, SubmitError> {
        (**self).submit(notes, cancel).await
    }
}
