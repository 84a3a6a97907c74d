//! Document Chunking
//!
//! Splits document text into token-bounded segments for embedding.
//! Text is broken down paragraph → sentence → word → character until every
//! piece fits the window, then pieces are merged greedily into chunks with
//! a small token overlap between neighbours.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loader::LoadedDocument;
use crate::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::context::tokens::count_tokens;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Invalid splitter configuration: {0}")]
    InvalidConfig(String),
    #[error("Document produced no text segments: {0}")]
    EmptyDocument(String),
}

impl Serialize for ChunkerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Smallest accepted window. A char is at most 4 UTF-8 bytes and byte-level
/// BPE never emits more tokens than bytes, so any single char fits.
pub const MIN_CHUNK_SIZE: u32 = 4;

/// Window policy, in tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitterConfig {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl SplitterConfig {
    pub fn new(chunk_size: u32, chunk_overlap: u32) -> Result<Self, ChunkerError> {
        let config = Self { chunk_size, chunk_overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChunkerError> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(ChunkerError::InvalidConfig(format!(
                "chunk size ({}) must be at least {} tokens",
                self.chunk_size, MIN_CHUNK_SIZE
            )));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkerError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Chunk index within document
    pub index: u32,
    /// Content of the chunk
    pub content: String,
    /// Start position in original text (bytes)
    pub start_pos: usize,
    /// End position in original text (bytes)
    pub end_pos: usize,
    /// Token count (cl100k_base)
    pub token_count: u32,
}

/// Document with its chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkedDocument {
    pub id: String,
    pub filename: String,
    pub total_tokens: u32,
    pub chunks: Vec<Chunk>,
}

/// Byte range of the source text that fits the window on its own
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy)]
enum Level {
    Paragraph,
    Sentence,
    Word,
    Character,
}

impl Level {
    fn next(self) -> Option<Level> {
        match self {
            Level::Paragraph => Some(Level::Sentence),
            Level::Sentence => Some(Level::Word),
            Level::Word => Some(Level::Character),
            Level::Character => None,
        }
    }
}

/// Chunk a loaded document. Zero chunks is an error.
pub fn chunk_document(document: &LoadedDocument, config: &SplitterConfig) -> Result<ChunkedDocument, ChunkerError> {
    config.validate()?;

    let chunks = split_text(&document.text, config);
    if chunks.is_empty() {
        return Err(ChunkerError::EmptyDocument(document.filename.clone()));
    }

    Ok(ChunkedDocument {
        id: document.id.clone(),
        filename: document.filename.clone(),
        total_tokens: count_tokens(&document.text),
        chunks,
    })
}

/// Split text into chunks of at most `chunk_size` tokens.
///
/// Each chunk after the first starts with the trailing pieces of its
/// predecessor, up to `chunk_overlap` tokens. Whitespace-only text yields
/// no chunks.
pub fn split_text(text: &str, config: &SplitterConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    split_to_fit(text, 0, text.len(), Level::Paragraph, config.chunk_size, &mut pieces);
    merge_pieces(text, &pieces, config)
}

/// Recursively break `text[start..end]` down until every piece fits.
fn split_to_fit(text: &str, start: usize, end: usize, level: Level, max_tokens: u32, out: &mut Vec<Piece>) {
    if count_tokens(&text[start..end]) <= max_tokens {
        out.push(Piece { start, end });
        return;
    }

    let ranges = match level {
        Level::Paragraph => split_paragraphs(text, start, end),
        Level::Sentence => split_sentences(text, start, end),
        Level::Word => split_words(text, start, end),
        Level::Character => split_chars(text, start, end, max_tokens),
    };

    match level.next() {
        Some(next) => {
            for (s, e) in ranges {
                split_to_fit(text, s, e, next, max_tokens, out);
            }
        }
        None => {
            for (s, e) in ranges {
                out.push(Piece { start: s, end: e });
            }
        }
    }
}

/// Split after each run of blank lines
fn split_paragraphs(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut ranges = Vec::new();
    let mut piece_start = 0usize;
    let mut search_from = 0usize;

    while let Some(found) = slice[search_from..].find("\n\n") {
        let mut boundary = search_from + found;
        while boundary < slice.len() && slice.as_bytes()[boundary] == b'\n' {
            boundary += 1;
        }
        ranges.push((start + piece_start, start + boundary));
        piece_start = boundary;
        search_from = boundary;
    }

    if piece_start < slice.len() {
        ranges.push((start + piece_start, end));
    }
    ranges
}

/// Split after sentence-ending punctuation followed by whitespace
fn split_sentences(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut ranges = Vec::new();
    let mut piece_start = 0usize;
    let mut chars = slice.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '。' | '！' | '？') {
            continue;
        }
        if !chars.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(false) {
            continue;
        }
        while chars.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(false) {
            chars.next();
        }
        let boundary = chars.peek().map(|(i, _)| *i).unwrap_or(slice.len());
        ranges.push((start + piece_start, start + boundary));
        piece_start = boundary;
    }

    if piece_start < slice.len() {
        ranges.push((start + piece_start, end));
    }
    ranges
}

/// Split after each run of whitespace
fn split_words(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let slice = &text[start..end];
    let mut ranges = Vec::new();
    let mut piece_start = 0usize;
    let mut prev_whitespace = false;

    for (i, c) in slice.char_indices() {
        let whitespace = c.is_whitespace();
        if prev_whitespace && !whitespace && i > piece_start {
            ranges.push((start + piece_start, start + i));
            piece_start = i;
        }
        prev_whitespace = whitespace;
    }

    if piece_start < slice.len() {
        ranges.push((start + piece_start, end));
    }
    ranges
}

/// Fixed windows of characters. A window of `max_tokens / 4` chars is at
/// most `max_tokens` bytes, and so at most `max_tokens` tokens.
fn split_chars(text: &str, start: usize, end: usize, max_tokens: u32) -> Vec<(usize, usize)> {
    let window = (max_tokens as usize / 4).max(1);
    let slice = &text[start..end];
    let mut ranges = Vec::new();
    let mut piece_start = 0usize;

    for (count, (i, _)) in slice.char_indices().enumerate() {
        if count > 0 && count % window == 0 {
            ranges.push((start + piece_start, start + i));
            piece_start = i;
        }
    }

    if piece_start < slice.len() {
        ranges.push((start + piece_start, end));
    }
    ranges
}

/// Greedily merge pieces into chunks, carrying an overlap forward.
///
/// Sizes are measured on the actual merged span, not summed per piece, since
/// BPE merges across piece boundaries.
fn merge_pieces(text: &str, pieces: &[Piece], config: &SplitterConfig) -> Vec<Chunk> {
    let span_tokens = |start: usize, end: usize| count_tokens(&text[start..end]);

    let mut chunks = Vec::new();
    let mut current: Vec<Piece> = Vec::new();

    for piece in pieces {
        let fits = match current.first() {
            Some(first) => span_tokens(first.start, piece.end) <= config.chunk_size,
            None => true,
        };

        if !fits {
            push_chunk(text, &current, &mut chunks);

            // Carry trailing pieces forward as overlap
            let tail_end = current.last().map(|p| p.end).unwrap_or(piece.start);
            let mut keep_from = current.len();
            while keep_from > 0 && span_tokens(current[keep_from - 1].start, tail_end) <= config.chunk_overlap {
                keep_from -= 1;
            }
            current.drain(..keep_from);

            while let Some(first) = current.first() {
                if span_tokens(first.start, piece.end) <= config.chunk_size {
                    break;
                }
                current.remove(0);
            }
        }

        current.push(*piece);
    }

    if !current.is_empty() {
        push_chunk(text, &current, &mut chunks);
    }

    chunks
}

fn push_chunk(text: &str, pieces: &[Piece], chunks: &mut Vec<Chunk>) {
    let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
        return;
    };

    let raw = &text[first.start..last.end];
    let trimmed_start = raw.len() - raw.trim_start().len();
    let content = raw.trim();
    if content.is_empty() {
        return;
    }

    let start_pos = first.start + trimmed_start;
    let end_pos = start_pos + content.len();

    // Skip a chunk identical to the one before it (overlap-only remainder)
    if let Some(prev) = chunks.last() {
        if prev.start_pos <= start_pos && end_pos <= prev.end_pos {
            return;
        }
    }

    chunks.push(Chunk {
        index: chunks.len() as u32,
        content: content.to_string(),
        start_pos,
        end_pos,
        token_count: count_tokens(content),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_sentences(n: usize) -> String {
        (0..n).map(|i| format!("Sentence number {} is short. ", i)).collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(SplitterConfig::new(512, 20).is_ok());
        assert!(matches!(SplitterConfig::new(0, 0), Err(ChunkerError::InvalidConfig(_))));
        assert!(matches!(SplitterConfig::new(2, 0), Err(ChunkerError::InvalidConfig(_))));
        assert!(SplitterConfig::new(MIN_CHUNK_SIZE, 0).is_ok());
        assert!(matches!(SplitterConfig::new(20, 20), Err(ChunkerError::InvalidConfig(_))));
    }

    #[test]
    fn test_multi_token_chars_respect_smallest_window() {
        // Each llama emoji is several tokens on its own
        let text = "🦙🦙🦙🦙 日本語のテキスト";
        let config = SplitterConfig::new(MIN_CHUNK_SIZE, 0).unwrap();
        let chunks = split_text(text, &config);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.token_count <= MIN_CHUNK_SIZE, "{:?} has {} tokens", chunk.content, chunk.token_count);
            assert_eq!(&text[chunk.start_pos..chunk.end_pos], chunk.content);
        }
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let config = SplitterConfig::default();
        assert!(split_text("", &config).is_empty());
        assert!(split_text("  \n\n \t", &config).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let content = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text(content, &SplitterConfig::default());

        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.start_pos, 0);
        assert_eq!(chunk.end_pos, content.len());
        assert_eq!(&content[chunk.start_pos..chunk.end_pos], chunk.content);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = numbered_sentences(200);
        let config = SplitterConfig::new(50, 10).unwrap();
        let chunks = split_text(&text, &config);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index as usize, i);
            assert!(chunk.token_count <= 50, "chunk {} has {} tokens", i, chunk.token_count);
            assert_eq!(&text[chunk.start_pos..chunk.end_pos], chunk.content);
        }
    }

    #[test]
    fn test_neighbours_overlap() {
        let text = numbered_sentences(100);
        let config = SplitterConfig::new(60, 20).unwrap();
        let chunks = split_text(&text, &config);

        let mut overlapping = 0;
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.start_pos > prev.start_pos);
            assert!(next.end_pos > prev.end_pos);
            if next.start_pos < prev.end_pos {
                overlapping += 1;
                let shared = &text[next.start_pos..prev.end_pos];
                assert!(count_tokens(shared) <= 20);
            }
        }
        assert!(overlapping > 0);
    }

    #[test]
    fn test_zero_overlap_is_contiguous() {
        let text = numbered_sentences(100);
        let config = SplitterConfig::new(40, 0).unwrap();
        let chunks = split_text(&text, &config);

        for pair in chunks.windows(2) {
            assert!(pair[1].start_pos >= pair[0].end_pos);
        }
    }

    #[test]
    fn test_long_word_is_split() {
        let text = "x".repeat(5_000);
        let config = SplitterConfig::new(32, 4).unwrap();
        let chunks = split_text(&text, &config);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 32));
    }

    #[test]
    fn test_sentence_split_boundaries() {
        let text = "One. Two!  Three? Four";
        let ranges = split_sentences(text, 0, text.len());
        let parts: Vec<&str> = ranges.iter().map(|(s, e)| &text[*s..*e]).collect();
        assert_eq!(parts, vec!["One. ", "Two!  ", "Three? ", "Four"]);
    }

    #[test]
    fn test_paragraph_split_boundaries() {
        let text = "a\n\n\nb\n\nc";
        let ranges = split_paragraphs(text, 0, text.len());
        let parts: Vec<&str> = ranges.iter().map(|(s, e)| &text[*s..*e]).collect();
        assert_eq!(parts, vec!["a\n\n\n", "b\n\n", "c"]);
    }

    #[test]
    fn test_chunk_document_empty_is_error() {
        let doc = LoadedDocument::new("blank.pdf", "   ");
        let err = chunk_document(&doc, &SplitterConfig::default()).unwrap_err();
        assert!(matches!(err, ChunkerError::EmptyDocument(ref name) if name == "blank.pdf"));
    }

    #[test]
    fn test_chunk_document() {
        let doc = LoadedDocument::new("doc.pdf", numbered_sentences(10));
        let chunked = chunk_document(&doc, &SplitterConfig::default()).unwrap();
        assert_eq!(chunked.id, doc.id);
        assert_eq!(chunked.chunks.len(), 1);
        assert!(chunked.total_tokens > 0);
    }
}
