use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::card::FlashcardRecord;
use crate::commands::quiz::{QuizFilter, select_cards};
use crate::crud::file_safe_subject;
use crate::stats::CollectionStats;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubjectQuery {
    pub subject: Option<String>,
    pub subtopic: Option<String>,
}

/// Stored cards in insertion order, optionally filtered and capped.
pub async fn list_flashcards(
    State(state): State<AppState>,
    Query(filter): Query<QuizFilter>,
) -> ApiResult<Json<Vec<FlashcardRecord>>> {
    let records = state.store.load_all_records().await?;
    let mut cards: Vec<FlashcardRecord> =
        records.into_iter().filter(|r| filter.matches(r)).collect();
    if let Some(limit) = filter.cap() {
        cards.truncate(limit);
    }
    Ok(Json(cards))
}

/// A shuffled deck for one quiz session.
pub async fn quiz_deck(
    State(state): State<AppState>,
    Query(filter): Query<QuizFilter>,
) -> ApiResult<Json<Vec<FlashcardRecord>>> {
    let records = state.store.load_all_records().await?;
    let deck = select_cards(&records, &filter, &mut rand::rng());
    Ok(Json(deck))
}

pub async fn list_subjects(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.subjects().await?))
}

pub async fn list_subtopics(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.subtopics(Some(&subject)).await?))
}

pub async fn count_flashcards(
    State(state): State<AppState>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<Json<CountResponse>> {
    let count = state
        .store
        .count(query.subject.as_deref(), query.subtopic.as_deref())
        .await?;
    Ok(Json(CountResponse { count }))
}

pub async fn collection_stats(State(state): State<AppState>) -> ApiResult<Json<CollectionStats>> {
    let records = state.store.load_all_records().await?;
    Ok(Json(CollectionStats::from_records(&records)))
}

/// One subject's cards as a JSON attachment.
pub async fn download_subject(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let records: Vec<FlashcardRecord> = state
        .store
        .load_all_records()
        .await?
        .into_iter()
        .filter(|r| r.subject == subject)
        .collect();
    if records.is_empty() {
        return Err(ApiError::NotFound(format!("no flashcards for subject {subject}")));
    }

    let disposition = format!(
        "attachment; filename=\"{}_flashcards.json\"",
        file_safe_subject(&subject)
    );
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(records)))
}
