use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::{BackendKind, Settings, StorageMode};
use crate::crud::FlashcardStore;
use crate::extract::discover_notes;
use crate::llm::{Backend, GenerationOptions, resolve_api_key};
use crate::palette::Palette;
use crate::pipeline::{GenerationOutput, PipelineSettings, StopSignal, generate_flashcards_for_files};
use crate::stats::GenerationStatistics;
use crate::utils::pluralize;

/// Command-line overrides for one generate run.
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub notes_dir: PathBuf,
    pub output: Option<PathBuf>,
    pub cards_per_chunk: Option<usize>,
    pub backend: Option<BackendKind>,
    pub model: Option<String>,
    pub url: Option<String>,
    pub storage_mode: Option<StorageMode>,
}

impl GenerateArgs {
    pub fn apply(&self, mut settings: Settings) -> Result<Settings> {
        if let Some(output) = &self.output {
            settings.output_dir = Some(output.clone());
        }
        if let Some(cards) = self.cards_per_chunk {
            settings.default_cards_per_chunk = cards;
        }
        if let Some(mode) = self.storage_mode {
            settings.storage_mode = mode;
        }
        if let Some(kind) = self.backend {
            settings.backend = settings.backend.with_kind(kind);
        }
        if let Some(model) = &self.model {
            settings.backend.set_model(model);
        }
        if let Some(url) = &self.url {
            settings.backend.set_url(url);
        }
        settings.validate()?;
        Ok(settings)
    }
}

pub async fn run(settings: Settings, args: GenerateArgs, stop: StopSignal) -> Result<()> {
    let settings = args.apply(settings)?;
    let notes = discover_notes(&args.notes_dir)?;
    if notes.is_empty() {
        println!(
            "No supported notes (.txt, .md, .docx, .pdf) found in {}",
            args.notes_dir.display()
        );
        return Ok(());
    }

    let api_key = resolve_api_key(&settings.backend)?;
    let options = GenerationOptions::from(&settings.generation);
    let backend = Backend::connect(&settings.backend, api_key, &options)
        .await
        .context("Could not reach the configured backend")?;

    println!("{}", Palette::header("GENERATING FLASHCARDS"));
    println!("{} {}", Palette::dim("Backend:"), backend);
    println!(
        "{} {}",
        Palette::dim("Notes:"),
        Palette::paint(Palette::INFO, pluralize("file", notes.len()))
    );
    info!(backend = %backend, files = notes.len(), "starting generation");

    let pipeline = PipelineSettings::from(&settings);
    let output = generate_flashcards_for_files(&backend, &notes, &pipeline, &stop).await;

    let store = FlashcardStore::new(settings.resolve_output_dir()?, settings.storage_mode);
    finish(&store, output).await
}

/// Print the run, save what was generated, then report anything that went
/// wrong. Cards from documents finished before a backend outage are saved.
async fn finish(store: &FlashcardStore, mut output: GenerationOutput) -> Result<()> {
    let fatal = output.fatal.take();

    print_summaries(&output);
    let failed_saves = save_output(store, &output).await;
    print_statistics(&GenerationStatistics::from_output(&output));

    if output.stopped {
        println!(
            "{}",
            Palette::paint(Palette::WARNING, "Stopped early; remaining chunks were not processed.")
        );
    }
    if let Some(failure) = fatal {
        return Err(failure.into_error());
    }
    if failed_saves > 0 {
        anyhow::bail!(
            "{} could not be saved",
            pluralize("subject", failed_saves)
        );
    }
    Ok(())
}

// Each subject is saved on its own so one bad file doesn't lose the rest.
async fn save_output(store: &FlashcardStore, output: &GenerationOutput) -> usize {
    let mut failed = 0;
    for (subject, records) in &output.cards_by_subject {
        match store.save_records(subject, records).await {
            Ok(path) => println!(
                "{} {} {} {}",
                Palette::paint(Palette::SUCCESS, "Saved"),
                pluralize("card", records.len()),
                Palette::dim("to"),
                path.display()
            ),
            Err(err) => {
                error!(subject = %subject, "failed to save cards: {err:#}");
                eprintln!(
                    "{} {subject}: {err:#}",
                    Palette::paint(Palette::DANGER, "Could not save")
                );
                failed += 1;
            }
        }
    }
    failed
}

fn print_summaries(output: &GenerationOutput) {
    for summary in &output.summaries {
        let color = if summary.records_kept > 0 {
            Palette::SUCCESS
        } else {
            Palette::WARNING
        };
        println!("  {}", Palette::paint(color, summary));
    }
    for failed in &output.failed {
        println!(
            "  {} {}: {}",
            Palette::paint(Palette::DANGER, "Failed"),
            failed.source_file,
            failed.reason
        );
    }
}

fn print_statistics(stats: &GenerationStatistics) {
    println!("\n{}", Palette::paint(Palette::ACCENT, "Generation Summary"));
    println!(
        "{} {}",
        Palette::dim("Total flashcards:"),
        Palette::paint(Palette::INFO, stats.total_cards)
    );
    println!(
        "{} {}",
        Palette::dim("Files processed:"),
        Palette::paint(Palette::INFO, stats.files_processed)
    );
    println!(
        "{} {}",
        Palette::dim("Average per file:"),
        Palette::paint(Palette::INFO, format!("{:.1}", stats.average_per_file()))
    );
    for (subject, count) in &stats.cards_by_subject {
        println!("  {} {}", Palette::dim(format!("{subject}:")), pluralize("card", *count));
    }
}
