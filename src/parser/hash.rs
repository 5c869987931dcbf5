use blake3::Hasher;

// things that shouldn't change the card key
// Leading/trailing whitespace
// Multiple spaces / tabs / newlines
// Line wrapping differences
// Case differences

// things that should change the card key
// Word order changes
// Punctuation changes
// Which side of the card a phrase is on
// Anything semantic

fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();

    let mut collapsed = String::with_capacity(lower.len());
    let mut last_was_space = false;

    for ch in lower.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }

    collapsed.trim().to_string()
}

/// Key under which two question/answer pairs count as the same card.
///
/// Returns `None` when either side is blank after normalization.
pub fn card_key(question: &str, answer: &str) -> Option<String> {
    let question = normalize(question);
    let answer = normalize(answer);
    if question.is_empty() || answer.is_empty() {
        return None;
    }

    let mut hasher = Hasher::new();
    hasher.update(question.as_bytes());
    // unit separator keeps "ab|c" and "a|bc" apart
    hasher.update(&[0x1f]);
    hasher.update(answer.as_bytes());

    Some(hasher.finalize().to_string())
}
