pub mod db;
pub mod flashcards;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::card::{FlashcardRecord, GENERAL};
use crate::config::StorageMode;
pub use db::DB;

const GLOBAL_DB_NAME: &str = "flashcards.db";
const DB_SUFFIX: &str = "_flashcards.db";

/// The card databases inside one output directory.
#[derive(Debug, Clone)]
pub struct FlashcardStore {
    output_dir: PathBuf,
    mode: StorageMode,
}

impl FlashcardStore {
    pub fn new(output_dir: impl Into<PathBuf>, mode: StorageMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            mode,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Database file that holds cards for `subject` under the current mode.
    pub fn db_path_for(&self, subject: &str) -> PathBuf {
        match self.mode {
            StorageMode::Global => self.output_dir.join(GLOBAL_DB_NAME),
            StorageMode::PerSubject => self
                .output_dir
                .join(format!("{}{DB_SUFFIX}", file_safe_subject(subject))),
        }
    }

    /// Append `records` for `subject` and return the file written.
    pub async fn save_records(
        &self,
        subject: &str,
        records: &[FlashcardRecord],
    ) -> Result<PathBuf> {
        let path = self.db_path_for(subject);
        if records.is_empty() {
            return Ok(path);
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output folder {}", self.output_dir.display())
        })?;

        let db = DB::open(&path).await?;
        let written = db.add_records(records).await;
        db.close().await;
        written.with_context(|| format!("Failed to write cards to {}", path.display()))?;

        debug!(path = %path.display(), count = records.len(), "saved cards");
        Ok(path)
    }

    /// Every card in every database of the output directory, whatever mode
    /// wrote it. Later copies of the same card win.
    pub async fn load_all_records(&self) -> Result<Vec<FlashcardRecord>> {
        let mut all = Vec::new();
        for path in self.database_files()? {
            let db = match DB::open(&path).await {
                Ok(db) => db,
                Err(err) => {
                    warn!(path = %path.display(), "skipping unreadable database: {err:#}");
                    continue;
                }
            };
            let loaded = db.all_records().await;
            db.close().await;
            match loaded {
                Ok(records) => all.extend(records),
                Err(err) => warn!(path = %path.display(), "skipping unreadable database: {err:#}"),
            }
        }
        Ok(keep_last_unique(all))
    }

    pub async fn subjects(&self) -> Result<Vec<String>> {
        let records = self.load_all_records().await?;
        Ok(distinct(records.iter().map(|r| r.subject.as_str())))
    }

    pub async fn subtopics(&self, subject: Option<&str>) -> Result<Vec<String>> {
        let records = self.load_all_records().await?;
        Ok(distinct(
            records
                .iter()
                .filter(|r| subject.is_none_or(|s| r.subject == s))
                .map(|r| r.subtopic.as_str()),
        ))
    }

    pub async fn count(&self, subject: Option<&str>, subtopic: Option<&str>) -> Result<usize> {
        let records = self.load_all_records().await?;
        Ok(records
            .iter()
            .filter(|r| subject.is_none_or(|s| r.subject == s))
            .filter(|r| subtopic.is_none_or(|t| r.subtopic == t))
            .count())
    }

    fn database_files(&self) -> Result<Vec<PathBuf>> {
        if !self.output_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.output_dir)
            .with_context(|| format!("Failed to list {}", self.output_dir.display()))?
        {
            let path = entry?.path();
            let is_card_db = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name == GLOBAL_DB_NAME || name.ends_with(DB_SUFFIX));
            if is_card_db && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

pub fn file_safe_subject(subject: &str) -> String {
    let cleaned: String = subject
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        GENERAL.to_string()
    } else {
        cleaned.to_string()
    }
}

fn keep_last_unique(records: Vec<FlashcardRecord>) -> Vec<FlashcardRecord> {
    let mut seen = HashSet::new();
    let mut kept: Vec<FlashcardRecord> = records
        .into_iter()
        .rev()
        .filter(|r| {
            seen.insert((
                r.subject.clone(),
                r.subtopic.clone(),
                r.question.clone(),
                r.answer.clone(),
            ))
        })
        .collect();
    kept.reverse();
    kept
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn record(subject: &str, subtopic: &str, question: &str, source: &str) -> FlashcardRecord {
        FlashcardRecord {
            subject: subject.into(),
            subtopic: subtopic.into(),
            source_file: source.into(),
            question: question.into(),
            answer: format!("answer to {question}"),
            difficulty: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn paths_follow_storage_mode() {
        let global = FlashcardStore::new("/out", StorageMode::Global);
        assert_eq!(global.db_path_for("Biology"), PathBuf::from("/out/flashcards.db"));

        let per_subject = FlashcardStore::new("/out", StorageMode::PerSubject);
        assert_eq!(
            per_subject.db_path_for("Biology"),
            PathBuf::from("/out/Biology_flashcards.db")
        );
        assert_eq!(
            per_subject.db_path_for("  "),
            PathBuf::from("/out/General_flashcards.db")
        );
        assert_eq!(
            per_subject.db_path_for("Bio/Chem"),
            PathBuf::from("/out/Bio_Chem_flashcards.db")
        );
    }

    #[tokio::test]
    async fn per_subject_files_are_unioned_on_load() {
        let dir = tempdir().unwrap();
        let store = FlashcardStore::new(dir.path(), StorageMode::PerSubject);

        let bio = store
            .save_records("Biology", &[record("Biology", "Cells", "Q1", "a.txt")])
            .await
            .unwrap();
        store
            .save_records("Physics", &[record("Physics", "Motion", "Q2", "b.txt")])
            .await
            .unwrap();
        std::fs::write(dir.path().join("notes.db"), b"not a card database").unwrap();

        assert!(bio.ends_with("Biology_flashcards.db"));
        let all = store.load_all_records().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.subjects().await.unwrap(), vec!["Biology", "Physics"]);
        assert_eq!(
            store.subtopics(Some("Physics")).await.unwrap(),
            vec!["Motion"]
        );
        assert_eq!(store.count(Some("Biology"), None).await.unwrap(), 1);
        assert_eq!(store.count(None, Some("Motion")).await.unwrap(), 1);
        assert_eq!(store.count(None, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn saving_again_appends_and_replaces_duplicates() {
        let dir = tempdir().unwrap();
        let store = FlashcardStore::new(dir.path(), StorageMode::Global);

        store
            .save_records("Biology", &[record("Biology", "Cells", "Q1", "old.txt")])
            .await
            .unwrap();
        store
            .save_records(
                "Biology",
                &[
                    record("Biology", "Cells", "Q1", "new.txt"),
                    record("Biology", "Cells", "Q2", "new.txt"),
                ],
            )
            .await
            .unwrap();

        let all = store.load_all_records().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.source_file == "new.txt"));
    }

    #[tokio::test]
    async fn empty_output_dir_has_no_cards() {
        let dir = tempdir().unwrap();
        let store = FlashcardStore::new(dir.path().join("missing"), StorageMode::Global);
        assert!(store.load_all_records().await.unwrap().is_empty());
        assert!(store.subjects().await.unwrap().is_empty());

        let path = store.save_records("Biology", &[]).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn union_keeps_the_last_copy() {
        let mut newer = record("Biology", "Cells", "Q1", "new.txt");
        newer.created_at = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let kept = keep_last_unique(vec![
            record("Biology", "Cells", "Q1", "old.txt"),
            record("Biology", "Cells", "Q2", "old.txt"),
            newer.clone(),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1], newer);
    }
}
