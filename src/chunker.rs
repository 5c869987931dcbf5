//! Line-greedy splitting of document text into generation-sized chunks.
//!
//! Chunks borrow from the source text and keep every byte of it, line
//! endings included, so concatenating them in order gives back the input.

/// A contiguous slice of a document, numbered from zero in source order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub text: &'a str,
}

impl Chunk<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Iterator over the chunks of a text. Cloning it restarts from the same
/// position, so a caller can walk the sequence more than once.
#[derive(Clone, Debug)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_chars: usize,
    next_index: usize,
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Lines are accumulated until the next one would push the chunk over the
/// limit. A line that is longer than the limit on its own becomes a chunk
/// by itself rather than being cut.
pub fn split(text: &str, max_chars: usize) -> Chunks<'_> {
    Chunks {
        rest: text,
        max_chars,
        next_index: 0,
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let mut end = 0;
        let mut chars = 0;
        for line in self.rest.split_inclusive('\n') {
            let line_chars = line.chars().count();
            if end > 0 && chars + line_chars > self.max_chars {
                break;
            }
            end += line.len();
            chars += line_chars;
            if chars > self.max_chars {
                break;
            }
        }

        let (text, rest) = self.rest.split_at(end);
        self.rest = rest;
        let chunk = Chunk {
            index: self.next_index,
            text,
        };
        self.next_index += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(text: &str, max_chars: usize) -> Vec<&str> {
        split(text, max_chars).map(|chunk| chunk.text).collect()
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert_eq!(split("", 100).count(), 0);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let text = "Mitosis is cell division.\nIt yields two cells.\n";
        let chunks: Vec<_> = split(text, 2000).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn lines_are_grouped_greedily() {
        let text = "aaaa\nbbbb\ncccc\n";
        assert_eq!(texts(text, 10), vec!["aaaa\nbbbb\n", "cccc\n"]);
    }

    #[test]
    fn oversized_line_stands_alone() {
        let long = "x".repeat(25);
        let text = format!("short\n{long}\ntail");
        let long_line = format!("{long}\n");
        let chunks = texts(&text, 10);
        assert_eq!(chunks, vec!["short\n", long_line.as_str(), "tail"]);
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let text = "ééééé\nééééé\n";
        assert_eq!(split(text, 12).count(), 1);
        assert_eq!(split(text, 11).count(), 2);
    }

    #[test]
    fn indices_follow_source_order() {
        let text = "one\ntwo\nthree\nfour\n";
        let indices: Vec<_> = split(text, 4).map(|chunk| chunk.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn cloned_iterator_restarts() {
        let chunks = split("a\nb\nc\n", 2);
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn chunks_rebuild_input_and_respect_limit(
            text in "[a-z .\n]{0,400}",
            max_chars in 1usize..80,
        ) {
            let chunks: Vec<_> = split(&text, max_chars).collect();
            let rebuilt: String = chunks.iter().map(|chunk| chunk.text).collect();
            prop_assert_eq!(&rebuilt, &text);

            for chunk in &chunks {
                let single_line = chunk.text.split_inclusive('\n').count() == 1;
                prop_assert!(chunk.char_len() <= max_chars || single_line);
                prop_assert!(!chunk.text.is_empty());
            }
        }
    }
}
