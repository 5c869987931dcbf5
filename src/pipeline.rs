//! Sequential flashcard generation: chunk, prompt, call the backend, parse,
//! assemble. One chunk is in flight at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::assemble::RecordAssembler;
use crate::card::{DocumentUnit, FlashcardRecord, NoteFile};
use crate::chunker;
use crate::config::{AssemblySettings, Settings};
use crate::extract::load_document;
use crate::llm::{Backend, BackendError, GenerationOptions, build_prompt};
use crate::parser::parse_response;

/// Shared flag checked between chunks. Setting it lets the current backend
/// call finish and starts nothing new.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_chars_per_chunk: usize,
    pub cards_per_chunk: usize,
    pub min_chunk_chars: usize,
    pub options: GenerationOptions,
    pub assembly: AssemblySettings,
}

impl From<&Settings> for PipelineSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            max_chars_per_chunk: settings.max_chars_per_chunk,
            cards_per_chunk: settings.default_cards_per_chunk,
            min_chunk_chars: settings.min_chunk_chars,
            options: GenerationOptions::from(&settings.generation),
            assembly: settings.assembly.clone(),
        }
    }
}

/// What happened to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSummary {
    pub subject: String,
    pub subtopic: String,
    pub source_file: String,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub chunks_skipped: usize,
    pub chunks_too_short: usize,
    pub candidates_parsed: usize,
    pub records_kept: usize,
    pub candidates_dropped: usize,
    pub duplicates_removed: usize,
}

impl fmt::Display for DocumentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} cards from {}/{} chunks ({} skipped, {} too short), {} dropped, {} duplicates",
            self.source_file,
            self.records_kept,
            self.chunks_processed,
            self.chunks_total,
            self.chunks_skipped,
            self.chunks_too_short,
            self.candidates_dropped,
            self.duplicates_removed,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    pub source_file: String,
    pub reason: String,
}

/// The backend error that ended a batch early.
#[derive(Debug)]
pub struct BackendFailure {
    pub source_file: String,
    pub error: BackendError,
}

impl BackendFailure {
    pub fn into_error(self) -> anyhow::Error {
        anyhow::Error::new(self.error).context(format!(
            "backend unavailable while processing {}",
            self.source_file
        ))
    }
}

/// Result of a whole batch.
///
/// When `fatal` is set the batch ended at that document. Cards from the
/// documents finished before it are still here.
#[derive(Debug, Default)]
pub struct GenerationOutput {
    pub cards_by_subject: BTreeMap<String, Vec<FlashcardRecord>>,
    pub summaries: Vec<DocumentSummary>,
    pub failed: Vec<FailedDocument>,
    pub stopped: bool,
    pub fatal: Option<BackendFailure>,
}

impl GenerationOutput {
    pub fn total_cards(&self) -> usize {
        self.cards_by_subject.values().map(Vec::len).sum()
    }

    fn add(&mut self, subject: &str, records: Vec<FlashcardRecord>) {
        if records.is_empty() {
            return;
        }
        self.cards_by_subject
            .entry(subject.to_string())
            .or_default()
            .extend(records);
    }
}

/// Generate cards for every note file in order.
///
/// A file that cannot be read is recorded in `failed` and the batch moves
/// on. A backend that is unavailable stops the batch at once and is reported
/// in `fatal`.
pub async fn generate_flashcards_for_files(
    backend: &Backend,
    notes: &[NoteFile],
    settings: &PipelineSettings,
    stop: &StopSignal,
) -> GenerationOutput {
    let mut output = GenerationOutput::default();

    for (position, note) in notes.iter().enumerate() {
        if stop.is_stopped() {
            output.stopped = true;
            break;
        }
        info!(
            file = %note.meta.source_file,
            subject = %note.meta.subject,
            "processing file {}/{}",
            position + 1,
            notes.len()
        );

        let document = match load_document(note).await {
            Ok(document) => document,
            Err(err) => {
                warn!(file = %note.full_path.display(), "skipping document: {err:#}");
                output.failed.push(FailedDocument {
                    source_file: note.meta.source_file.clone(),
                    reason: format!("{err:#}"),
                });
                continue;
            }
        };

        if !run_document(backend, &document, settings, stop, &mut output).await {
            break;
        }
    }

    output
}

/// Same as [`generate_flashcards_for_files`] for documents already in memory.
pub async fn generate_flashcards_for_documents(
    backend: &Backend,
    documents: &[DocumentUnit],
    settings: &PipelineSettings,
    stop: &StopSignal,
) -> GenerationOutput {
    let mut output = GenerationOutput::default();
    for document in documents {
        if stop.is_stopped() {
            output.stopped = true;
            break;
        }
        if !run_document(backend, document, settings, stop, &mut output).await {
            break;
        }
    }
    output
}

async fn run_document(
    backend: &Backend,
    document: &DocumentUnit,
    settings: &PipelineSettings,
    stop: &StopSignal,
    output: &mut GenerationOutput,
) -> bool {
    match generate_for_document(backend, document, settings, stop).await {
        Ok((records, summary, stopped)) => {
            info!(
                file = %summary.source_file,
                cards = summary.records_kept,
                skipped = summary.chunks_skipped,
                dropped = summary.candidates_dropped,
                "document done"
            );
            output.add(&document.meta.subject, records);
            output.summaries.push(summary);
            output.stopped |= stopped;
            true
        }
        Err(error) => {
            error!(file = %document.meta.source_file, "backend unavailable: {error}");
            output.fatal = Some(BackendFailure {
                source_file: document.meta.source_file.clone(),
                error,
            });
            false
        }
    }
}

/// Run every chunk of one document through the backend.
///
/// Chunk-level backend failures are logged and skipped. Only a fatal
/// backend error is returned, since every later call would fail the same way.
pub async fn generate_for_document(
    backend: &Backend,
    document: &DocumentUnit,
    settings: &PipelineSettings,
    stop: &StopSignal,
) -> Result<(Vec<FlashcardRecord>, DocumentSummary, bool), BackendError> {
    let meta = &document.meta;
    let mut summary = DocumentSummary {
        subject: meta.subject.clone(),
        subtopic: meta.subtopic.clone(),
        source_file: meta.source_file.clone(),
        ..DocumentSummary::default()
    };
    let mut assembler = RecordAssembler::new(meta, &settings.assembly);
    let mut records = Vec::new();
    let mut stopped = false;

    for chunk in chunker::split(&document.text, settings.max_chars_per_chunk) {
        summary.chunks_total += 1;

        if stopped || stop.is_stopped() {
            stopped = true;
            continue;
        }

        if chunk.is_blank() || chunk.text.trim().chars().count() < settings.min_chunk_chars {
            debug!(file = %meta.source_file, chunk = chunk.index, "chunk too short, skipping");
            summary.chunks_too_short += 1;
            continue;
        }

        let prompt = build_prompt(&chunk, settings.cards_per_chunk);
        let raw = match backend.generate(&prompt, &settings.options).await {
            Ok(raw) => raw,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    file = %meta.source_file,
                    chunk = chunk.index,
                    "skipping chunk: {err}"
                );
                summary.chunks_skipped += 1;
                continue;
            }
        };

        if raw.is_blank() {
            debug!(file = %meta.source_file, chunk = chunk.index, "backend returned an empty response");
        }
        let candidates = parse_response(raw.as_str());
        if candidates.is_empty() {
            debug!(file = %meta.source_file, chunk = chunk.index, "no flashcards in response");
        }
        let kept = assembler.assemble(&candidates);

        debug!(
            file = %meta.source_file,
            chunk = chunk.index,
            parsed = candidates.len(),
            kept = kept.len(),
            "chunk processed"
        );
        summary.chunks_processed += 1;
        summary.candidates_parsed += candidates.len();
        records.extend(kept);
    }

    let stats = assembler.stats();
    summary.records_kept = stats.kept;
    summary.candidates_dropped = stats.dropped;
    summary.duplicates_removed = stats.duplicates;

    Ok((records, summary, stopped))
}
