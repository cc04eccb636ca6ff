//! Rembs API endpoints.

use crate::client::RemberClient;
use crate::error::RemberResult;
use rember_core::{Notes, Submission};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Version of the request payload understood by the endpoint.
pub const PAYLOAD_VERSION: &str = "1";

/// Rembs API for turning notes into rembs.
pub struct RembsApi<'a> {
    client: &'a RemberClient,
}

impl<'a> RembsApi<'a> {
    pub(crate) fn new(client: &'a RemberClient) -> Self {
        Self { client }
    }

    /// Generate flashcards for each note and store them as rembs.
    pub async fn generate_cards_and_create_rembs(
        &self,
        notes: &Notes,
        cancel: &CancellationToken,
    ) -> RemberResult<Submission> {
        let request = GenerateCardsRequest {
            version: PAYLOAD_VERSION,
            notes,
        };
        self.client
            .http
            .post("api/v1/generate-cards-and-create-rembs", &request, cancel)
            .await
    }
}

/// Request body of `POST /api/v1/generate-cards-and-create-rembs`.
#[derive(Debug, Serialize)]
struct GenerateCardsRequest<'a> {
    version: &'static str,
    notes: &'a Notes,
}
