//! Text chunking strategies
//!
//! Documents longer than the embedding model accepts are split into
//! overlapping passages. Every chunk records the byte span it covers in the
//! parent document so retrieval results can be resolved back to text.

use crate::data::{Chunk, Document, Span};
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Trait for text chunking strategies
pub trait Chunker: Send + Sync {
    /// Split a document into chunks
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Configuration for chunking (sizes in characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Chunking strategy: "sentence" or "overlapping"
    pub strategy: String,
    /// Maximum size of each chunk
    pub chunk_size: usize,
    /// Overlap between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: "sentence".to_string(),
            chunk_size: 400,
            chunk_overlap: 50,
        }
    }
}

impl ChunkConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidInput("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Byte offset of every char in `text`, plus `text.len()` as a final sentinel
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Shrink a span so it neither starts nor ends with whitespace
fn trim_span(text: &str, span: Span) -> Span {
    let slice = &text[span.start..span.end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return Span::new(span.start, span.start);
    }
    Span::new(span.start + leading, span.end - trailing)
}

/// Character-window chunker with a fixed overlap
pub struct OverlappingChunker {
    config: ChunkConfig,
}

impl OverlappingChunker {
    /// Create a new overlapping chunker with the given configuration
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Character windows over `span` of `text`
    fn windows(&self, text: &str, span: Span) -> Vec<Span> {
        let offsets = char_offsets(&text[span.start..span.end]);
        let num_chars = offsets.len() - 1;
        let step = self.config.chunk_size - self.config.chunk_overlap;

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.config.chunk_size).min(num_chars);
            spans.push(Span::new(span.start + offsets[start], span.start + offsets[end]));
            if end >= num_chars {
                break;
            }
            start += step;
        }
        spans
    }
}

impl Chunker for OverlappingChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let text = &document.text;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .windows(text, Span::whole(text))
            .into_iter()
            .map(|span| trim_span(text, span))
            .filter(|span| !span.is_empty())
            .enumerate()
            .map(|(idx, span)| Chunk::from_document(document, span, idx))
            .collect())
    }
}

/// Sentence-aware chunker
///
/// Packs whole sentences into chunks up to `chunk_size` characters. The next
/// chunk starts a few sentences before the previous one ended (roughly one
/// sentence per 50 characters of configured overlap, at most half of the
/// chunk). Sentences longer than `chunk_size` fall back to character windows.
pub struct SentenceChunker {
    config: ChunkConfig,
    windows: OverlappingChunker,
}

impl SentenceChunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        let windows = OverlappingChunker::new(config.clone())?;
        Ok(Self { config, windows })
    }

    fn overlap_sentences(&self, sentence_count: usize) -> usize {
        (sentence_count / 2).min(self.config.chunk_overlap / 50).max(1)
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let text = &document.text;

        let sentences: Vec<Span> = text
            .split_sentence_bound_indices()
            .map(|(start, s)| trim_span(text, Span::new(start, start + s.len())))
            .filter(|span| !span.is_empty())
            .collect();

        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let char_len = |span: Span| text[span.start..span.end].chars().count();

        let mut spans: Vec<Span> = Vec::new();
        let mut i = 0;
        while i < sentences.len() {
            let first = sentences[i];

            if char_len(first) > self.config.chunk_size {
                spans.extend(
                    self.windows
                        .windows(text, first)
                        .into_iter()
                        .map(|span| trim_span(text, span))
                        .filter(|span| !span.is_empty()),
                );
                i += 1;
                continue;
            }

            let mut count = 1;
            while i + count < sentences.len() {
                let candidate = Span::new(first.start, sentences[i + count].end);
                if char_len(candidate) > self.config.chunk_size {
                    break;
                }
                count += 1;
            }

            spans.push(Span::new(first.start, sentences[i + count - 1].end));

            if i + count >= sentences.len() {
                break;
            }
            if count <= 1 {
                i += 1;
            } else {
                i += (count - self.overlap_sentences(count)).max(1);
            }
        }

        Ok(spans
            .into_iter()
            .enumerate()
            .map(|(idx, span)| Chunk::from_document(document, span, idx))
            .collect())
    }
}

/// Create a chunker based on strategy name
pub fn create_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    match config.strategy.as_str() {
        "sentence" => Ok(Box::new(SentenceChunker::new(config)?)),
        "overlapping" | "fixed" => Ok(Box::new(OverlappingChunker::new(config)?)),
        other => {
            tracing::warn!("Unknown chunking strategy '{}', using sentence", other);
            Ok(Box::new(SentenceChunker::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: &str, chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            strategy: strategy.to_string(),
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_short_document_is_single_chunk() {
        let doc = Document::new("doc1", "The sky is blue.");
        let chunker = SentenceChunker::new(ChunkConfig::default()).unwrap();
        let chunks = chunker.chunk(&doc).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The sky is blue.");
        assert_eq!(chunks[0].span, Span::new(0, 16));
    }

    #[test]
    fn test_overlapping_chunker_windows() {
        let doc = Document::new("doc1", "abcdefghijklmnopqrstuvwxyz");
        let chunker = OverlappingChunker::new(config("overlapping", 10, 3)).unwrap();
        let chunks = chunker.chunk(&doc).unwrap();

        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks.last().unwrap().span.end, 26);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 10);
            assert_eq!(doc.passage(chunk.span), Some(chunk.text.as_str()));
        }
    }

    #[test]
    fn test_overlapping_chunker_multibyte_boundaries() {
        let doc = Document::new("doc1", "héllo wörld ünïcode téxt");
        let chunker = OverlappingChunker::new(config("overlapping", 5, 1)).unwrap();
        let chunks = chunker.chunk(&doc).unwrap();

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(doc.passage(chunk.span), Some(chunk.text.as_str()));
        }
    }

    #[test]
    fn test_sentence_chunker_overlaps_sentences() {
        let doc = Document::new(
            "doc1",
            "First sentence here. Second sentence here. Third sentence here. Fourth sentence here.",
        );
        let chunker = SentenceChunker::new(config("sentence", 45, 40)).unwrap();
        let chunks = chunker.chunk(&doc).unwrap();

        assert_eq!(chunks[0].text, "First sentence here. Second sentence here.");
        assert_eq!(chunks[1].text, "Second sentence here. Third sentence here.");
        assert!(chunks.last().unwrap().text.ends_with("Fourth sentence here."));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 45);
            assert_eq!(doc.passage(chunk.span), Some(chunk.text.as_str()));
        }
    }

    #[test]
    fn test_sentence_chunker_splits_long_sentence() {
        let long = "word ".repeat(40);
        let doc = Document::new("doc1", long.trim());
        let chunker = SentenceChunker::new(config("sentence", 50, 10)).unwrap();
        let chunks = chunker.chunk(&doc).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 50);
        }
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let doc = Document::new("doc1", "   \n ");
        let chunker = create_chunker(ChunkConfig::default()).unwrap();
        assert!(chunker.chunk(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(OverlappingChunker::new(config("overlapping", 10, 10)).is_err());
    }
}
