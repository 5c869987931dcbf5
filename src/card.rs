use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const GENERAL: &str = "General";

/// Where a document came from and how it is classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentMeta {
    pub subject: String,
    pub subtopic: String,
    pub source_file: String,
}

impl DocumentMeta {
    pub fn new(
        subject: impl Into<String>,
        subtopic: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            subtopic: subtopic.into(),
            source_file: source_file.into(),
        }
    }
}

/// Extracted plain text of one note file plus its classification.
#[derive(Clone, Debug)]
pub struct DocumentUnit {
    pub text: String,
    pub meta: DocumentMeta,
}

impl DocumentUnit {
    pub fn new(text: impl Into<String>, meta: DocumentMeta) -> Self {
        Self {
            text: text.into(),
            meta,
        }
    }
}

/// A note file found on disk, before its text has been extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteFile {
    pub full_path: PathBuf,
    pub meta: DocumentMeta,
}

/// A question/answer pair lifted out of model output. Not yet validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashcardCandidate {
    pub question: String,
    pub answer: String,
}

impl FlashcardCandidate {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A validated card ready for storage.
///
/// Question and answer are non-empty, free of control characters, and
/// within the configured length limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlashcardRecord {
    pub subject: String,
    pub subtopic: String,
    pub source_file: String,
    pub question: String,
    pub answer: String,
    /// Reserved for a later scoring pass; always empty when generated.
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}
