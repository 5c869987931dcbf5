use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::card::{DocumentMeta, FlashcardCandidate, FlashcardRecord};
use crate::config::{AssemblySettings, OverflowPolicy};
use crate::parser::card_key;
use crate::utils::{collapse_whitespace, strip_controls_and_escapes};

/// Counters for one document pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub kept: usize,
    pub dropped: usize,
    pub duplicates: usize,
}

/// Turns candidates into records for a single document.
///
/// The assembler remembers every card it has emitted, so a pair the model
/// repeats in a later chunk of the same document is only kept once.
#[derive(Debug)]
pub struct RecordAssembler<'a> {
    meta: &'a DocumentMeta,
    limits: &'a AssemblySettings,
    seen: HashSet<String>,
    stats: AssemblyStats,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(meta: &'a DocumentMeta, limits: &'a AssemblySettings) -> Self {
        Self {
            meta,
            limits,
            seen: HashSet::new(),
            stats: AssemblyStats::default(),
        }
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    pub fn assemble(&mut self, candidates: &[FlashcardCandidate]) -> Vec<FlashcardRecord> {
        self.assemble_at(candidates, Utc::now())
    }

    pub fn assemble_at(
        &mut self,
        candidates: &[FlashcardCandidate],
        created_at: DateTime<Utc>,
    ) -> Vec<FlashcardRecord> {
        let mut records = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let Some((question, answer)) = self.validate(candidate) else {
                self.stats.dropped += 1;
                continue;
            };

            let Some(key) = card_key(&question, &answer) else {
                self.stats.dropped += 1;
                continue;
            };
            if !self.seen.insert(key) {
                self.stats.duplicates += 1;
                continue;
            }

            records.push(FlashcardRecord {
                subject: self.meta.subject.clone(),
                subtopic: self.meta.subtopic.clone(),
                source_file: self.meta.source_file.clone(),
                question,
                answer,
                difficulty: String::new(),
                created_at,
            });
            self.stats.kept += 1;
        }

        records
    }

    fn validate(&self, candidate: &FlashcardCandidate) -> Option<(String, String)> {
        let question = clean_field(&candidate.question);
        let answer = clean_field(&candidate.answer);
        if question.is_empty() || answer.is_empty() {
            return None;
        }

        let question = fit_length(question, self.limits.max_question_chars, self.limits.overflow)?;
        let answer = fit_length(answer, self.limits.max_answer_chars, self.limits.overflow)?;
        Some((question, answer))
    }
}

/// One-shot assembly for callers that hold a single batch of candidates.
pub fn assemble(
    candidates: &[FlashcardCandidate],
    meta: &DocumentMeta,
    limits: &AssemblySettings,
) -> Vec<FlashcardRecord> {
    RecordAssembler::new(meta, limits).assemble(candidates)
}

fn clean_field(raw: &str) -> String {
    collapse_whitespace(&strip_controls_and_escapes(raw))
}

fn fit_length(value: String, max_chars: usize, policy: OverflowPolicy) -> Option<String> {
    if value.chars().count() <= max_chars {
        return Some(value);
    }
    match policy {
        OverflowPolicy::Drop => None,
        OverflowPolicy::Truncate => {
            let cut: String = value.chars().take(max_chars).collect();
            let cut = cut.trim_end().to_string();
            (!cut.is_empty()).then_some(cut)
        }
    }
}
