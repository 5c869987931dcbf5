use std::collections::BTreeMap;

use serde::Serialize;

use crate::card::FlashcardRecord;
use crate::pipeline::GenerationOutput;

/// Totals for one generation run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerationStatistics {
    pub total_cards: usize,
    pub files_processed: usize,
    pub cards_by_subject: BTreeMap<String, usize>,
    /// Keyed by `subject/subtopic/file` so equal file names stay apart.
    pub cards_by_file: BTreeMap<String, usize>,
}

impl GenerationStatistics {
    pub fn from_output(output: &GenerationOutput) -> Self {
        let mut stats = Self {
            files_processed: output.summaries.len(),
            ..Default::default()
        };

        for summary in &output.summaries {
            *stats
                .cards_by_file
                .entry(file_key(&summary.subject, &summary.subtopic, &summary.source_file))
                .or_insert(0) += summary.records_kept;
        }
        for (subject, records) in &output.cards_by_subject {
            stats.total_cards += records.len();
            *stats.cards_by_subject.entry(subject.clone()).or_insert(0) += records.len();
        }
        stats
    }

    pub fn average_per_file(&self) -> f64 {
        if self.files_processed == 0 {
            0.0
        } else {
            self.total_cards as f64 / self.files_processed as f64
        }
    }
}

/// Card counts over a stored collection.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub total_cards: usize,
    pub by_subject: Vec<(String, usize)>,
    pub by_subtopic: Vec<(String, usize)>,
    pub by_file: Vec<(String, usize)>,
}

impl CollectionStats {
    pub fn from_records(records: &[FlashcardRecord]) -> Self {
        Self {
            total_cards: records.len(),
            by_subject: ranked(records.iter().map(|r| r.subject.clone())),
            by_subtopic: ranked(records.iter().map(|r| format!("{}/{}", r.subject, r.subtopic))),
            by_file: ranked(
                records
                    .iter()
                    .map(|r| file_key(&r.subject, &r.subtopic, &r.source_file)),
            ),
        }
    }
}

fn file_key(subject: &str, subtopic: &str, source_file: &str) -> String {
    format!("{subject}/{subtopic}/{source_file}")
}

// Largest count first, ties by name.
fn ranked(values: impl Iterator<Item = String>) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DocumentSummary;
    use chrono::Utc;

    fn record(subject: &str, subtopic: &str, file: &str) -> FlashcardRecord {
        FlashcardRecord {
            subject: subject.into(),
            subtopic: subtopic.into(),
            source_file: file.into(),
            question: "Q".into(),
            answer: "A".into(),
            difficulty: String::new(),
            created_at: Utc::now(),
        }
    }

    fn summary(file: &str, kept: usize) -> DocumentSummary {
        DocumentSummary {
            subject: "Biology".into(),
            subtopic: "Cells".into(),
            source_file: file.into(),
            records_kept: kept,
            ..DocumentSummary::default()
        }
    }

    #[test]
    fn generation_statistics_totals() {
        let mut output = GenerationOutput::default();
        output.cards_by_subject.insert(
            "Biology".into(),
            vec![record("Biology", "Cells", "a.txt"), record("Biology", "Cells", "b.txt")],
        );
        output
            .cards_by_subject
            .insert("Physics".into(), vec![record("Physics", "Motion", "c.md")]);
        output.summaries = vec![summary("a.txt", 1), summary("b.txt", 1), summary("c.md", 1), summary("d.md", 0)];

        let stats = GenerationStatistics::from_output(&output);
        assert_eq!(stats.total_cards, 3);
        assert_eq!(stats.files_processed, 4);
        assert_eq!(stats.cards_by_subject["Biology"], 2);
        assert_eq!(stats.cards_by_file["Biology/Cells/d.md"], 0);
        assert!((stats.average_per_file() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(GenerationStatistics::default().average_per_file(), 0.0);
    }

    #[test]
    fn collection_counts_are_ranked() {
        let records = vec![
            record("Physics", "Motion", "c.md"),
            record("Biology", "Cells", "a.txt"),
            record("Biology", "Genetics", "a.txt"),
        ];
        let stats = CollectionStats::from_records(&records);
        assert_eq!(stats.total_cards, 3);
        assert_eq!(
            stats.by_subject,
            vec![("Biology".to_string(), 2), ("Physics".to_string(), 1)]
        );
        assert_eq!(stats.by_subtopic[0], ("Biology/Cells".to_string(), 1));
        assert_eq!(stats.by_file[0], ("Biology/Cells/a.txt".to_string(), 1));
    }

    #[test]
    fn same_file_name_in_different_folders_is_counted_apart() {
        let records = vec![
            record("Biology", "Cells", "notes.md"),
            record("Biology", "Cells", "notes.md"),
            record("Physics", "Motion", "notes.md"),
        ];
        let stats = CollectionStats::from_records(&records);
        assert_eq!(
            stats.by_file,
            vec![
                ("Biology/Cells/notes.md".to_string(), 2),
                ("Physics/Motion/notes.md".to_string(), 1),
            ]
        );

        let mut output = GenerationOutput::default();
        output.summaries = vec![
            DocumentSummary {
                subject: "Biology".into(),
                subtopic: "Cells".into(),
                source_file: "notes.md".into(),
                records_kept: 2,
                ..DocumentSummary::default()
            },
            DocumentSummary {
                subject: "Physics".into(),
                subtopic: "Motion".into(),
                source_file: "notes.md".into(),
                records_kept: 1,
                ..DocumentSummary::default()
            },
        ];
        let stats = GenerationStatistics::from_output(&output);
        assert_eq!(stats.cards_by_file.len(), 2);
        assert_eq!(stats.cards_by_file["Physics/Motion/notes.md"], 1);
    }
}
