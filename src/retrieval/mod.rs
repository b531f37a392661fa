//! Vector retrieval
//!
//! Exact (flat) and approximate (HNSW) vector indexes behind a common
//! [`VectorIndex`] trait, their on-disk form, and the query-side
//! [`Retriever`].

use crate::data::Span;
use crate::embedding::Embedding;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub mod index;
pub mod retriever;
pub mod store;

// Re-exports
pub use index::*;
pub use retriever::*;
pub use store::*;

/// Similarity metric, fixed per index instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Negative squared Euclidean distance
    Euclidean,
}

impl Metric {
    /// Similarity between two equal-length vectors (higher is more similar)
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Euclidean => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!("unknown metric '{}' (expected cosine or euclidean)", other)),
        }
    }
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot_product / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// One indexed vector: a whole document or one chunk of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Parent document
    pub document_id: String,
    /// Chunk position in the parent document
    pub span: Span,
    /// Embedding of the chunk text
    pub vector: Embedding,
}

impl IndexEntry {
    pub fn new(document_id: impl Into<String>, span: Span, vector: Embedding) -> Self {
        Self {
            document_id: document_id.into(),
            span,
            vector,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub document_id: String,
    pub span: Span,
    /// Similarity to the query (higher is better)
    pub score: f32,
}

/// Hits ranked by descending similarity; position is the rank
pub type RetrievalResult = Vec<ScoredEntry>;

/// Rank order: score descending, then document id, then span start
pub fn rank_order(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.span.cmp(&b.span))
}

/// Score `entries` against `query` and keep the best `k` in rank order
pub(crate) fn exact_top_k<'a, I>(metric: Metric, query: &[f32], entries: I, k: usize) -> RetrievalResult
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut scored: Vec<ScoredEntry> = entries
        .into_iter()
        .map(|entry| ScoredEntry {
            document_id: entry.document_id.clone(),
            span: entry.span,
            score: metric.similarity(query, &entry.vector),
        })
        .collect();

    if k == 0 {
        return Vec::new();
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, rank_order);
        scored.truncate(k);
    }
    scored.sort_by(rank_order);
    scored
}
