use anyhow::Result;

use crate::crud::FlashcardStore;
use crate::palette::Palette;
use crate::stats::CollectionStats;
use crate::utils::pluralize;

const TOP_N: usize = 10;

pub async fn run(store: &FlashcardStore) -> Result<()> {
    let records = store.load_all_records().await?;
    if records.is_empty() {
        println!("No flashcards found in {}.", store.output_dir().display());
        return Ok(());
    }

    let stats = CollectionStats::from_records(&records);
    println!("{}", Palette::header("FLASHCARD STATISTICS"));
    println!(
        "{} {}",
        Palette::dim("Total flashcards:"),
        Palette::paint(Palette::INFO, stats.total_cards)
    );

    render_group("Subject", &stats.by_subject);
    render_group("Subtopic", &stats.by_subtopic);
    render_group("Source File", &stats.by_file);
    Ok(())
}

fn render_group(label: &str, counts: &[(String, usize)]) {
    println!(
        "\n{}",
        Palette::paint(Palette::ACCENT, format!("By {label} ({})", counts.len()))
    );
    let max = counts.first().map(|(_, count)| *count).unwrap_or(0);
    for (name, count) in counts.iter().take(TOP_N) {
        println!("  {} {}", Palette::dim(format!("{name}:")), format_bar(*count, max));
    }
    if counts.len() > TOP_N {
        println!("  {}", Palette::dim(format!("... and {} more", counts.len() - TOP_N)));
    }
}

fn format_bar(count: usize, max: usize) -> String {
    let width = 20usize;
    let filled = if max == 0 {
        0
    } else {
        ((count as f64 / max as f64) * width as f64).round() as usize
    };
    let clamped = filled.min(width);
    let bar = "#".repeat(clamped);
    let remainder = "-".repeat(width - clamped);
    format!(
        "{} {}",
        Palette::paint(Palette::INFO, bar + &remainder),
        Palette::dim(pluralize("card", count))
    )
}
