use std::path::Path;

use anyhow::Context;
use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use tracing::{info, warn};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::card::{DocumentMeta, DocumentUnit, FlashcardRecord, GENERAL};
use crate::extract::{NoteFormat, extract_text};
use crate::pipeline::{DocumentSummary, StopSignal, generate_flashcards_for_documents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub status: FileStatus,
    pub cards_generated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileReport {
    fn error(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: FileStatus::Error,
            cards_generated: 0,
            message: Some(message.into()),
        }
    }

    fn from_summary(summary: &DocumentSummary) -> Self {
        let (status, message) = if summary.records_kept > 0 {
            (FileStatus::Success, None)
        } else {
            (FileStatus::Warning, Some("No flashcards generated".to_string()))
        };
        Self {
            filename: summary.source_file.clone(),
            status,
            cards_generated: summary.records_kept,
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub subject: String,
    pub subtopic: String,
    pub flashcards: Vec<FlashcardRecord>,
    pub processed_files: Vec<FileReport>,
    pub total_cards: usize,
}

struct UploadedFile {
    filename: String,
    data: Vec<u8>,
}

/// Multipart upload: `subject`, `subtopic` and one or more `files` parts.
/// Cards are generated, saved, and returned.
pub async fn upload_notes(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut subject = GENERAL.to_string();
    let mut subtopic = GENERAL.to_string();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "subject" | "subtopic" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read {name}: {e}")))?;
                if let Some(value) = crate::utils::trim_line(&value) {
                    if name == "subject" {
                        subject = value.to_string();
                    } else {
                        subtopic = value.to_string();
                    }
                }
            }
            "files" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                files.push(UploadedFile {
                    filename,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    if files.iter().all(|file| file.filename.is_empty()) {
        return Err(ApiError::BadRequest("No files provided".into()));
    }

    let workdir = tempfile::tempdir().context("Failed to create upload folder")?;
    let mut reports = Vec::new();
    let mut documents = Vec::new();
    for file in files {
        let Some(filename) = plain_file_name(&file.filename) else {
            reports.push(FileReport::error(file.filename, "Invalid file name"));
            continue;
        };
        if NoteFormat::from_path(Path::new(&filename)).is_none() {
            reports.push(FileReport::error(filename, "Invalid file type"));
            continue;
        }

        let path = workdir.path().join(&filename);
        tokio::fs::write(&path, &file.data)
            .await
            .with_context(|| format!("Failed to store upload {filename}"))?;
        match extract_text(&path).await {
            Ok(text) => documents.push(DocumentUnit::new(
                text,
                DocumentMeta::new(&subject, &subtopic, &filename),
            )),
            Err(err) => {
                warn!(file = %filename, "could not read upload: {err:#}");
                reports.push(FileReport::error(filename, format!("{err:#}")));
            }
        }
    }

    let mut output = {
        let _running = state.generation.lock().await;
        generate_flashcards_for_documents(
            &state.backend,
            &documents,
            &state.pipeline,
            &StopSignal::new(),
        )
        .await
    };
    let fatal = output.fatal.take();

    reports.extend(output.summaries.iter().map(FileReport::from_summary));
    for (card_subject, records) in &output.cards_by_subject {
        state.store.save_records(card_subject, records).await?;
    }
    if let Some(failure) = fatal {
        return Err(ApiError::BackendUnavailable(format!(
            "{:#}",
            failure.into_error()
        )));
    }

    let flashcards: Vec<FlashcardRecord> = output.cards_by_subject.into_values().flatten().collect();
    info!(subject = %subject, cards = flashcards.len(), "upload processed");
    Ok(Json(UploadResponse {
        success: true,
        subject,
        subtopic,
        total_cards: flashcards.len(),
        flashcards,
        processed_files: reports,
    }))
}

// Drops any directory part a client put in the name.
fn plain_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(crate::utils::trim_line)
        .map(str::to_string)
}
