use crate::chunker::Chunk;

const PROMPT_HEADER: &str = r#"You are a helpful study assistant and an expert at creating educational flashcards.
Each flashcard should test understanding of an important concept, definition, or relationship from the notes.
Make questions clear and specific. Make answers concise but complete, and never reveal the answer inside the question.
"#;

const FORMAT_RULES: &str = r#"Output format (follow it exactly):
- One flashcard per line.
- Each line is: Q: <question> | A: <answer>
- Do not number the lines and do not add any text before or after the flashcards.

Example:
Q: What organelle produces most of a cell's ATP? | A: The mitochondrion.
"#;

/// Render the generation prompt for one chunk.
///
/// The output format is restated on every call since no backend guarantees
/// structured output.
pub fn build_prompt(chunk: &Chunk<'_>, card_count: usize) -> String {
    let card_word = if card_count == 1 { "flashcard" } else { "flashcards" };
    format!(
        "{PROMPT_HEADER}\nCreate exactly {card_count} {card_word} from the notes below.\n\n{FORMAT_RULES}\nNotes:\n{notes}\n\nFlashcards:\n",
        notes = chunk.text.trim()
    )
}
