//! JSON service over the generation pipeline and the card store.

pub mod backend;
pub mod error;
pub mod flashcards;
pub mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::sync::Mutex;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::crud::FlashcardStore;
use crate::llm::{Backend, GenerationOptions};
use crate::pipeline::PipelineSettings;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub store: FlashcardStore,
    pub pipeline: PipelineSettings,
    /// Held for the whole of one generation so backend calls stay one at a time.
    pub generation: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(backend: Backend, store: FlashcardStore, pipeline: PipelineSettings) -> Self {
        Self {
            backend: Arc::new(backend),
            store,
            pipeline,
            generation: Arc::new(Mutex::new(())),
        }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.pipeline.options
    }
}

pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload::upload_notes))
        .route("/download/:subject", get(flashcards::download_subject))
        .route("/api/flashcards", get(flashcards::list_flashcards))
        .route("/api/quiz", get(flashcards::quiz_deck))
        .route("/api/subjects", get(flashcards::list_subjects))
        .route("/api/subjects/:subject/subtopics", get(flashcards::list_subtopics))
        .route("/api/count", get(flashcards::count_flashcards))
        .route("/api/stats", get(flashcards::collection_stats))
        .route("/api/backend/test", get(backend::test_backend))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(trace_layer)
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(backend = %state.backend, "server running on http://{addr}");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
