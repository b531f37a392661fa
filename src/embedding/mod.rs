//! Embedding generation and caching
//!
//! Provides trait-based embedding interface with support for multiple backends
//! (hashed bag-of-words, Ollama) and persistent caching with SQLite.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod backends;
pub mod cache;

// Re-exports
pub use backends::*;
pub use cache::*;

/// Represents an embedding vector
pub type Embedding = Vec<f32>;

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend: "token", "mock" or "ollama"
    pub backend: String,
    /// Model name; persisted indexes are tied to it
    pub model_name: String,
    /// Output dimensionality
    pub dimension: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Maximum input length in characters
    pub max_length: usize,
    /// Batch size for processing
    pub batch_size: usize,
    /// Base URL of the model server (ollama backend)
    pub base_url: String,
    /// Per-call timeout in seconds (ollama backend)
    pub timeout_secs: u64,
    /// SQLite file for the persistent embedding cache
    pub cache_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "token".to_string(),
            model_name: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            normalize: true,
            max_length: 2000,
            batch_size: 32,
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
            cache_path: None,
        }
    }
}

/// Trait for embedding models
///
/// Implementations are deterministic: the same text and model always yield
/// the same vector.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed multiple texts; same per-item result as calling `embed`
    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Model identity, `<backend>:<model>`; persisted indexes and cached
    /// vectors are tied to it
    fn model_name(&self) -> &str;
}

/// Identity string for `model` served by `backend`
pub fn model_id(backend: &str, model: &str) -> String {
    format!("{}:{}", backend, model)
}

/// Reject inputs longer than `max_length` characters
pub fn check_input_length(text: &str, max_length: usize) -> Result<()> {
    let len = text.chars().count();
    if len > max_length {
        return Err(RagError::InputTooLong { len, max: max_length });
    }
    Ok(())
}

/// Normalize an embedding vector (L2 normalization)
pub fn normalize_embedding(embedding: &mut Embedding) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        for val in embedding.iter_mut() {
            *val /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_embedding() {
        let mut emb = vec![3.0, 4.0];
        normalize_embedding(&mut emb);

        // 3-4-5 triangle, so normalized should be [0.6, 0.8]
        assert!((emb[0] - 0.6).abs() < 1e-6);
        assert!((emb[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_is_noop() {
        let mut emb = vec![0.0, 0.0];
        normalize_embedding(&mut emb);
        assert_eq!(emb, vec![0.0, 0.0]);
    }

    #[test]
    fn test_check_input_length_counts_chars() {
        assert!(check_input_length("héllo", 5).is_ok());
        match check_input_length("héllo!", 5) {
            Err(RagError::InputTooLong { len, max }) => {
                assert_eq!(len, 6);
                assert_eq!(max, 5);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
