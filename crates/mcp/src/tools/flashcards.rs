// The create-flashcards tool: turns notes into rembs through the Rember API

use super::{Tool, ToolId};
use crate::error::ToolError;
use crate::policy::RecoveryChain;
use crate::schema::{Field, Schema};
use rember_core::{DomainErrorKind, FlashcardBackend, Note, Notes, MAX_NOTES, MAX_NOTE_LENGTH};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const MAX_SOURCE_LENGTH: usize = 100;

pub const QUOTA_EXCEEDED_MESSAGE: &str = "You've reached your monthly limit. Visit https://www.rember.com/settings/account to upgrade to Rember Pro and get more AI generated rembs.";
pub const INVALID_CREDENTIAL_MESSAGE: &str = "Your Rember API key is invalid. Generate a new one at https://www.rember.com/settings/mcp-api and update your MCP configuration.";
pub const RATE_LIMITED_MESSAGE: &str =
    "Rember is receiving too many requests right now. Wait a minute and try again.";
pub const ITEM_COUNT_EXCEEDED_MESSAGE: &str =
    "Too many notes in a single request. Send at most 50 notes at a time.";

const DESCRIPTION: &str = r#"A tool to generate spaced-repetition flashcards in Rember.

What is Rember?
Rember is a spaced-repetition system built around rembs. A remb is a short note about one concept or idea, together with a few flashcards that test it. Rembs can be reviewed in Rember like in Anki, and exported to Anki.

Input and behavior:
The input is a list of notes. Each note is sent to the Rember API, which turns it into a remb by generating flashcards with its own AI prompts, independently from this conversation. A single note usually yields 4-5 flashcards.

When to use this tool:
- The user asks you to help them remember an answer: create one remb summarizing it
- The user asks for flashcards about a conversation: create one or two rembs on its core insights
- The user shares a PDF or webpage: extract the main points as individual rembs
- The user wants to study a complex topic: break it down into rembs on the hard parts

The user might say things like "Help me remember that ...", "Create flashcards for ...", "Add this to Rember" or "I want to study this later".

Rules for writing notes:
1. Prefer summarizing information into a single note
2. Create many notes only when the user wants to remember many different concepts
3. Focus on essential concepts, unless the user explicitly asks about details
4. Keep each note atomic, focused on a single concept or idea
5. Make each note self-contained, understandable without the others
6. Be concise and avoid unnecessary verbiage
7. Do not repeat the same information across notes
8. Attribute sources specifically ("Researcher Name states..." rather than "The article suggests...")
9. If the user asks for "N flashcards", explain that Rember generates flashcards from notes and offer to create notes on the topic instead
10. Follow any other indication from the user"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateFlashcardsInput {
    pub notes: Vec<Note>,
    #[serde(default)]
    pub source: Option<String>,
}

impl CreateFlashcardsInput {
    /// Notes as sent to the backend, with the source appended to every note.
    pub fn to_notes(&self) -> Result<Notes, ToolError> {
        let notes = self
            .notes
            .iter()
            .map(|note| match &self.source {
                Some(source) => Note::new(format!("{}\n\n{}", note.text, source)),
                None => note.clone(),
            })
            .collect();

        Notes::new(notes).map_err(|e| ToolError::Rejected(e.to_string()))
    }
}

/// Text returned once the backend accepted the notes.
pub fn success_message(created: u64) -> String {
    format!(
        "{created} rembs have been created. The number of created flashcards is unknown, \
         report to the user something like \"I've created {created} rembs in Rember, each remb \
         contains multiple flashcards. You can review your flashcards at https://rember.com/review/\"."
    )
}

pub struct CreateFlashcards {
    backend: Arc<dyn FlashcardBackend>,
}

impl CreateFlashcards {
    pub fn new(backend: Arc<dyn FlashcardBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl Tool for CreateFlashcards {
    type Input = CreateFlashcardsInput;
    type Output = String;

    fn id(&self) -> ToolId {
        ToolId::CreateFlashcards
    }

    fn description(&self) -> String {
        DESCRIPTION.to_string()
    }

    fn input_schema(&self) -> Schema {
        let note = Schema::object(vec![Field::required(
            "text",
            Schema::string()
                .max_length(MAX_NOTE_LENGTH)
                .title("Text")
                .description("The text content of the note"),
        )])
        .title("Note")
        .description("A little note about a concept or idea");

        Schema::object(vec![
            Field::required(
                "notes",
                Schema::array(note)
                    .max_items(MAX_NOTES)
                    .title("Notes")
                    .description("A list of little notes"),
            ),
            Field::optional(
                "source",
                Schema::string()
                    .max_length(MAX_SOURCE_LENGTH)
                    .title("Source")
                    .description(
                        "The resource (e.g. article, book, pdf, webpage) the notes are about \
                         (e.g. 'Author - Title'). Omit this field unless the notes are about a \
                         specific concrete resource.",
                    ),
            ),
        ])
    }

    fn recovery(&self) -> RecoveryChain {
        RecoveryChain::new()
            .on(DomainErrorKind::QuotaExceeded, QUOTA_EXCEEDED_MESSAGE)
            .on(DomainErrorKind::InvalidCredential, INVALID_CREDENTIAL_MESSAGE)
            .on(DomainErrorKind::RateLimited, RATE_LIMITED_MESSAGE)
            .on(DomainErrorKind::ItemCountExceeded, ITEM_COUNT_EXCEEDED_MESSAGE)
    }

    async fn call(
        &self,
        input: &CreateFlashcardsInput,
        cancel: CancellationToken,
    ) -> Result<String, ToolError> {
        let notes = input.to_notes()?;
        let submission = self.backend.submit(&notes, &cancel).await?;

        tracing::info!(
            notes = notes.len(),
            created = submission.quantity,
            usage_month = submission.usage_month,
            max_usage_month = submission.max_usage_month,
            "Created rembs"
        );
        Ok(success_message(submission.quantity))
    }
}
