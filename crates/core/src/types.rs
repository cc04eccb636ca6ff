use crate::error::{InvalidApiKey, NotesError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Every API key starts with this prefix.
pub const API_KEY_PREFIX: &str = "rember_";

/// Number of hex characters following [`API_KEY_PREFIX`].
pub const API_KEY_SUFFIX_LEN: usize = 32;

/// Maximum number of notes accepted in a single submission.
pub const MAX_NOTES: usize = 50;

/// Maximum length of a single note, in characters.
pub const MAX_NOTE_LENGTH: usize = 2000;

/// A Rember API key: `rember_` followed by 32 lowercase hex characters.
///
/// The raw value is only reachable through [`ApiKey::expose`]; `Debug` never
/// prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidApiKey> {
        let raw = raw.into();
        let suffix = raw.strip_prefix(API_KEY_PREFIX).ok_or(InvalidApiKey)?;

        let valid = suffix.len() == API_KEY_SUFFIX_LEN
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(InvalidApiKey);
        }

        Ok(Self(raw))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for ApiKey {
    type Err = InvalidApiKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey({}<redacted>)", API_KEY_PREFIX)
    }
}

/// A little note about a concept or idea
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A bounded list of notes, at most [`MAX_NOTES`] items of at most
/// [`MAX_NOTE_LENGTH`] characters each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Notes(Vec<Note>);

impl Notes {
    pub fn new(notes: Vec<Note>) -> Result<Self, NotesError> {
        if notes.len() > MAX_NOTES {
            return Err(NotesError::TooMany {
                count: notes.len(),
                max: MAX_NOTES,
            });
        }

        for (index, note) in notes.iter().enumerate() {
            let length = note.text.chars().count();
            if length > MAX_NOTE_LENGTH {
                return Err(NotesError::TooLong {
                    index,
                    length,
                    max: MAX_NOTE_LENGTH,
                });
            }
        }

        Ok(Self(notes))
    }

    pub fn as_slice(&self) -> &[Note] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Notes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let notes = Vec::<Note>::deserialize(deserializer)?;
        Notes::new(notes).map_err(serde::de::Error::custom)
    }
}

/// Outcome of a successful submission reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Number of rembs created
    pub quantity: u64,
    pub usage_month: u64,
    pub max_usage_month: u64,
}
