//! Sentence-window chunking.
//!
//! Every sentence of a document becomes one retrievable chunk. The chunk's `text` is the
//! sentence itself, which is what gets embedded and cited back to the caller. Its
//! `window_text` adds up to `window_size` neighbouring sentences on each side and is what the
//! generative model reads as context.
//!
//! Highlights:
//!
//! - Sentence boundaries: `.`, `!`, or `?` (plus any closing quotes/brackets) followed by
//!   whitespace or end of text, and blank lines. Decimal numbers such as `3.14` stay intact
//!   because the terminator must be followed by whitespace.
//! - Windows are slices of the original text, so a document with no more sentences than
//!   `window_size + 1` yields windows equal to the whole (trimmed) document.
//! - [`SentenceWindows`] is a plain iterator: finite, consumed once by the embedding step.

use super::types::ChunkingError;
use crate::extract::ExtractedDocument;

/// Default number of sentences kept on each side of a chunk's center sentence.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

/// A sentence plus its surrounding context, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedChunk {
    /// Position of the sentence within the document, starting at zero.
    pub ordinal: usize,
    /// The center sentence, preserved verbatim for citation.
    pub text: String,
    /// The center sentence with its neighbouring sentences.
    pub window_text: String,
    /// Path of the document the sentence came from.
    pub source_path: String,
}

/// Splits documents into sentence-window chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkWindower {
    window_size: usize,
}

impl Default for ChunkWindower {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl ChunkWindower {
    /// Create a windower keeping `window_size` sentences on each side.
    pub const fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Configured window size.
    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    /// Split a document into chunks, failing when it holds no sentence at all.
    pub fn window<'a>(
        &self,
        document: &'a ExtractedDocument,
    ) -> Result<SentenceWindows<'a>, ChunkingError> {
        let spans = sentence_spans(&document.text);
        if spans.is_empty() {
            return Err(ChunkingError::EmptyDocument);
        }
        Ok(SentenceWindows {
            text: &document.text,
            source_path: &document.source_path,
            spans,
            window_size: self.window_size,
            next: 0,
        })
    }
}

/// Iterator over the chunks of one document.
pub struct SentenceWindows<'a> {
    text: &'a str,
    source_path: &'a str,
    spans: Vec<(usize, usize)>,
    window_size: usize,
    next: usize,
}

impl Iterator for SentenceWindows<'_> {
    type Item = WindowedChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next;
        let (start, end) = *self.spans.get(index)?;
        self.next += 1;

        let first = index.saturating_sub(self.window_size);
        let last = index
            .saturating_add(self.window_size)
            .min(self.spans.len() - 1);
        let window_start = self.spans[first].0;
        let window_end = self.spans[last].1;

        Some(WindowedChunk {
            ordinal: index,
            text: self.text[start..end].to_string(),
            window_text: self.text[window_start..window_end].to_string(),
            source_path: self.source_path.to_string(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.spans.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SentenceWindows<'_> {}

/// Split `text` into sentences, returning trimmed byte spans.
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|(start, end)| &text[start..end])
        .collect()
}

fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        let boundary = match ch {
            '.' | '!' | '?' => {
                let mut end = index + ch.len_utf8();
                while let Some(&(next_index, next)) = chars.peek() {
                    if matches!(next, '.' | '!' | '?') || CLOSERS.contains(&next) {
                        end = next_index + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    None => Some(end),
                    Some(&(_, next)) if next.is_whitespace() => Some(end),
                    _ => None,
                }
            }
            '\n' if text[index + 1..].trim_start_matches([' ', '\t', '\r']).starts_with('\n') => {
                Some(index)
            }
            _ => None,
        };

        if let Some(end) = boundary {
            push_trimmed(text, start, end, &mut spans);
            start = end;
        }
    }

    push_trimmed(text, start, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let segment = &text[start..end];
    let trimmed_start = segment.len() - segment.trim_start().len();
    let trimmed = segment.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        let begin = start + trimmed_start;
        spans.push((begin, begin + trimmed.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(text: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: text.to_string(),
            source_path: "uploads/doc.txt".to_string(),
        }
    }

    fn numbered(count: usize) -> String {
        (1..=count)
            .map(|n| format!("Sentence number {n}."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn splits_on_terminators_and_blank_lines() {
        let text = "Hello world. Is pi 3.14? Yes!\n\nHeading without stop\nnext line. \"Quoted.\" Done";
        assert_eq!(
            split_sentences(text),
            vec![
                "Hello world.",
                "Is pi 3.14?",
                "Yes!",
                "Heading without stop\nnext line.",
                "\"Quoted.\"",
                "Done",
            ]
        );
    }

    #[test]
    fn punctuation_only_fragments_are_dropped() {
        assert_eq!(split_sentences("... !!! Real one."), vec!["Real one."]);
        assert!(split_sentences("  \n\n  ").is_empty());
    }

    #[test]
    fn one_chunk_per_sentence_with_ordinals() {
        let doc = document(&numbered(12));
        let chunks: Vec<_> = ChunkWindower::default().window(&doc).expect("chunks").collect();

        assert_eq!(chunks.len(), 12);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, index);
            assert_eq!(chunk.text, format!("Sentence number {}.", index + 1));
            assert_eq!(chunk.source_path, "uploads/doc.txt");
            assert!(chunk.window_text.contains(&chunk.text));
        }
    }

    #[test]
    fn window_spans_neighbouring_sentences() {
        let doc = document(&numbered(12));
        let chunks: Vec<_> = ChunkWindower::new(2).window(&doc).expect("chunks").collect();

        assert_eq!(
            chunks[5].window_text,
            "Sentence number 4. Sentence number 5. Sentence number 6. Sentence number 7. Sentence number 8."
        );
        assert_eq!(
            chunks[0].window_text,
            "Sentence number 1. Sentence number 2. Sentence number 3."
        );
        assert_eq!(
            chunks[11].window_text,
            "Sentence number 10. Sentence number 11. Sentence number 12."
        );
    }

    #[test]
    fn short_documents_window_the_whole_text() {
        let text = "  Alpha beta. Gamma delta! Epsilon?  ";
        let doc = document(text);
        let chunks: Vec<_> = ChunkWindower::new(5).window(&doc).expect("chunks").collect();

        assert_eq!(chunks.len(), 3);
        for chunk in chunks {
            assert_eq!(chunk.window_text, text.trim());
        }
    }

    #[test]
    fn oversized_window_covers_the_whole_text() {
        let text = "One. Two. Three.";
        let doc = document(text);
        let chunks: Vec<_> = ChunkWindower::new(usize::MAX)
            .window(&doc)
            .expect("chunks")
            .collect();

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.window_text == text));
    }

    #[test]
    fn empty_document_is_rejected() {
        let doc = document(" \n\t ");
        assert!(matches!(
            ChunkWindower::default().window(&doc),
            Err(ChunkingError::EmptyDocument)
        ));
    }

    #[test]
    fn iterator_reports_exact_length() {
        let doc = document(&numbered(7));
        let mut windows = ChunkWindower::default().window(&doc).expect("chunks");
        assert_eq!(windows.len(), 7);
        windows.next();
        assert_eq!(windows.len(), 6);
    }
}
