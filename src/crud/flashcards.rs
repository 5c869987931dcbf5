use anyhow::Result;
use futures::TryStreamExt;

use crate::card::FlashcardRecord;

use super::DB;

impl DB {
    /// Append records in one transaction. A row with the same subject,
    /// subtopic, question and answer is replaced, so the newest copy wins
    /// and moves to the end.
    pub async fn add_records(&self, records: &[FlashcardRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
            INSERT OR REPLACE INTO flashcards (
                subject,
                subtopic,
                source_file,
                question,
                answer,
                difficulty,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(&record.subject)
            .bind(&record.subtopic)
            .bind(&record.source_file)
            .bind(&record.question)
            .bind(&record.answer)
            .bind(&record.difficulty)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Every row in insertion order.
    pub async fn all_records(&self) -> Result<Vec<FlashcardRecord>> {
        let mut rows = sqlx::query_as::<_, FlashcardRecord>(
            r#"
            SELECT subject, subtopic, source_file, question, answer, difficulty, created_at
            FROM flashcards
            ORDER BY rowid
            "#,
        )
        .fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(record) = rows.try_next().await? {
            records.push(record);
        }
        Ok(records)
    }
}
