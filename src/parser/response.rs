use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::card::FlashcardCandidate;
use crate::utils::trim_line;

static LIST_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\(?\d+[.)]|[-*+•>]|#{1,6})\s+").unwrap());
static QUESTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:q|question)\s*\d*\s*:\s*(.*)$").unwrap());
static ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:a|ans|answer)\s*\d*\s*:\s*(.*)$").unwrap());
static INLINE_ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\|\s*|\s+)(?:a|answer)\s*:\s*").unwrap());

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Section {
    Question,
    Answer,
    None,
}

/// Pull question/answer pairs out of free-form model output.
///
/// Marker lines (`Q:` / `A:`, either on one line joined by `|` or on
/// consecutive lines) are tried first, then `question::answer` lines, then a
/// JSON array of `{"question", "answer"}` objects anywhere in the text.
/// Output that matches none of these yields an empty list, not an error.
pub fn parse_response(raw: &str) -> Vec<FlashcardCandidate> {
    let candidates = parse_marked_lines(raw);
    if !candidates.is_empty() {
        return candidates;
    }
    let candidates = parse_double_colon_lines(raw);
    if !candidates.is_empty() {
        return candidates;
    }
    parse_json_array(raw)
}

fn parse_marked_lines(raw: &str) -> Vec<FlashcardCandidate> {
    let mut candidates: Vec<FlashcardCandidate> = Vec::new();
    let mut question_lines: Vec<String> = Vec::new();
    let mut section = Section::None;

    for raw_line in raw.lines() {
        let Some(line) = normalize_line(raw_line) else {
            // a blank line ends an answer but a question may still get one
            if section == Section::Answer {
                section = Section::None;
            }
            continue;
        };

        if let Some(rest) = capture_rest(&QUESTION_RE, &line) {
            match split_inline_answer(rest) {
                Some((question, answer)) => {
                    candidates.push(candidate(question, answer));
                    question_lines.clear();
                    section = Section::None;
                }
                None => {
                    question_lines.clear();
                    if let Some(text) = trim_line(rest) {
                        question_lines.push(text.to_string());
                    }
                    section = Section::Question;
                }
            }
            continue;
        }

        if let Some(rest) = capture_rest(&ANSWER_RE, &line) {
            if section == Section::Question {
                let question = question_lines.join(" ");
                question_lines.clear();
                candidates.push(candidate(&question, rest));
                section = Section::Answer;
            } else {
                section = Section::None;
            }
            continue;
        }

        match section {
            Section::Question => question_lines.push(line),
            Section::Answer => match candidates.last_mut() {
                Some(last) if !ends_sentence(&last.answer) => {
                    if !last.answer.is_empty() {
                        last.answer.push(' ');
                    }
                    last.answer.push_str(&line);
                }
                // a finished answer followed by prose is the model talking
                _ => section = Section::None,
            },
            Section::None => {}
        }
    }

    // an unanswered question left at the end is truncated output, and a
    // marker with nothing after it is no answer at all
    candidates.retain(|candidate| !candidate.answer.is_empty());
    candidates
}

fn parse_double_colon_lines(raw: &str) -> Vec<FlashcardCandidate> {
    raw.lines()
        .filter_map(normalize_line)
        .filter_map(|line| {
            let (left, right) = line.split_once("::")?;
            let left = trim_line(left)?;
            let right = trim_line(right)?;
            // "cards about std::vector:" introduces a list, it isn't a card
            if right.ends_with(':') {
                return None;
            }
            Some(candidate(left, right))
        })
        .collect()
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?', '"', ')'])
}

fn normalize_line(raw_line: &str) -> Option<String> {
    let mut line = trim_line(raw_line)?.replace("**", "");
    loop {
        let stripped = LIST_PREFIX_RE.replace(&line, "");
        if stripped.len() == line.len() {
            break;
        }
        line = stripped.into_owned();
    }
    trim_line(&line).map(str::to_string)
}

fn capture_rest<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn split_inline_answer(rest: &str) -> Option<(&str, &str)> {
    let found = INLINE_ANSWER_RE.find(rest)?;
    Some((&rest[..found.start()], &rest[found.end()..]))
}

fn candidate(question: &str, answer: &str) -> FlashcardCandidate {
    let question = question.trim().trim_end_matches('|').trim_end();
    FlashcardCandidate::new(question, answer.trim())
}

fn parse_json_array(raw: &str) -> Vec<FlashcardCandidate> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let Ok(items) = serde_json::from_str::<Vec<Value>>(&raw[start..=end]) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let question = field_as_str(item, &["question", "Question", "q"])?;
            let answer = field_as_str(item, &["answer", "Answer", "a"])?;
            Some(FlashcardCandidate::new(question.trim(), answer.trim()))
        })
        .collect()
}

fn field_as_str<'a>(item: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| item.get(*name).and_then(Value::as_str))
}
