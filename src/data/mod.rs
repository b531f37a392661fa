//! Documents, chunks and the corpus store
//!
//! This module provides the document model, loaders for reading documents
//! from disk, and chunkers that split long documents into overlapping
//! passages for embedding and retrieval.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod chunkers;
pub mod corpus;
pub mod loaders;

// Re-exports for convenience
pub use chunkers::*;
pub use corpus::*;
pub use loaders::*;

/// Scalar metadata value attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Document metadata, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A source document
///
/// Immutable once indexed; replacing the text requires removing and
/// re-adding the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for the document
    pub id: String,
    /// Full text content of the document
    pub text: String,
    /// Metadata associated with the document
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a new document without metadata
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Text covered by `span`, if the span is valid for this document
    pub fn passage(&self, span: Span) -> Option<&str> {
        self.text.get(span.start..span.end)
    }
}

/// Byte range of a chunk within its parent document
///
/// Both ends always fall on UTF-8 character boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span covering a whole text
    pub fn whole(text: &str) -> Self {
        Self::new(0, text.len())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Reference to the parent document ID
    pub document_id: String,
    /// Position in the parent document
    pub span: Span,
    /// Chunk index in the document
    pub chunk_index: usize,
    /// The chunk text content
    pub text: String,
}

impl Chunk {
    /// Create a new chunk, copying its text out of the parent document
    pub fn from_document(document: &Document, span: Span, chunk_index: usize) -> Self {
        Self {
            document_id: document.id.clone(),
            span,
            chunk_index,
            text: document.text[span.start..span.end].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passage_respects_span() {
        let doc = Document::new("doc1", "The sky is blue. Grass is green.");
        assert_eq!(doc.passage(Span::new(0, 16)), Some("The sky is blue."));
        assert_eq!(doc.passage(Span::new(0, 500)), None);
    }

    #[test]
    fn test_metadata_serializes_as_scalars() {
        let doc = Document::new("doc1", "text")
            .with_metadata("filename", "notes.txt")
            .with_metadata("chunk_count", 3i64)
            .with_metadata("reviewed", true);

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"filename\":\"notes.txt\""));
        assert!(json.contains("\"chunk_count\":3"));

        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata["chunk_count"], MetadataValue::Int(3));
        assert_eq!(back.metadata["reviewed"], MetadataValue::Bool(true));
    }
}
