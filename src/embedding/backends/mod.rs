//! Embedding backend implementations
//!
//! Offline hashing embedders plus an HTTP backend for a local Ollama server.

use crate::embedding::{check_input_length, model_id, normalize_embedding, Embedder, Embedding, EmbeddingConfig};
use crate::error::{RagError, Result};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

pub mod ollama;

pub use ollama::OllamaEmbedder;

use super::CachedEmbedder;

/// Mock embedder for testing (generates random but deterministic embeddings)
pub struct MockEmbedder {
    config: EmbeddingConfig,
    model_id: String,
}

impl MockEmbedder {
    /// Create a new mock embedder
    pub fn new(config: EmbeddingConfig) -> Self {
        let model_id = model_id("mock", &config.model_name);
        Self { config, model_id }
    }

    /// Generate a deterministic embedding based on text hash
    fn generate_embedding(&self, text: &str) -> Embedding {
        let seed = xxh3_64(text.as_bytes());

        let mut embedding = Vec::with_capacity(self.config.dimension);
        let mut state = seed;

        for _ in 0..self.config.dimension {
            // Simple LCG (Linear Congruential Generator)
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let value = ((state / 65536) % 10000) as f32 / 10000.0 - 0.5;
            embedding.push(value);
        }

        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }
        embedding
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        check_input_length(text, self.config.max_length)?;
        Ok(self.generate_embedding(text))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Simple token-based embedder (hashed bag of words with TF weighting)
///
/// Needs no model files, so it is the default for offline use.
pub struct TokenEmbedder {
    config: EmbeddingConfig,
    model_id: String,
}

impl TokenEmbedder {
    /// Create a new token-based embedder
    pub fn new(config: EmbeddingConfig) -> Self {
        let model_id = model_id("token", &config.model_name);
        Self { config, model_id }
    }

    /// Generate embeddings based on token hashing
    fn generate_embedding(&self, text: &str) -> Embedding {
        let dimension = self.config.dimension;
        let mut embedding = vec![0.0; dimension];

        // Tokenize by whitespace and punctuation
        let tokens: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|s| !s.is_empty())
            .collect();

        if tokens.is_empty() || dimension == 0 {
            return embedding;
        }

        for token in &tokens {
            let idx = (xxh3_64(token.to_lowercase().as_bytes()) % dimension as u64) as usize;
            embedding[idx] += 1.0;
        }

        let total_tokens = tokens.len() as f32;
        for val in embedding.iter_mut() {
            *val /= total_tokens;
        }

        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }

        embedding
    }
}

impl Embedder for TokenEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        check_input_length(text, self.config.max_length)?;
        Ok(self.generate_embedding(text))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Create an embedder from configuration
///
/// Wraps the backend in a [`CachedEmbedder`] when `cache_path` is set.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if config.dimension == 0 {
        return Err(RagError::InvalidInput("embedding dimension must be positive".into()));
    }

    let base: Box<dyn Embedder> = match config.backend.as_str() {
        "mock" => Box::new(MockEmbedder::new(config.clone())),
        "token" => Box::new(TokenEmbedder::new(config.clone())),
        "ollama" => Box::new(OllamaEmbedder::new(config.clone())?),
        other => {
            tracing::warn!("Unknown backend '{}', using token-based embedder", other);
            Box::new(TokenEmbedder::new(config.clone()))
        }
    };

    tracing::info!(
        "Embedder ready: {} (backend={}, dim={})",
        base.model_name(),
        config.backend,
        base.dimension()
    );

    match &config.cache_path {
        Some(path) => Ok(Arc::new(CachedEmbedder::new(base, path)?)),
        None => Ok(Arc::from(base)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: model.to_string(),
            dimension,
            normalize: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_mock_embedder() {
        let embedder = MockEmbedder::new(config("test-model", 128));

        let text = "Hello, world!";
        let emb = embedder.embed(text).unwrap();

        assert_eq!(emb.len(), 128);

        // Should be deterministic
        let emb2 = embedder.embed(text).unwrap();
        assert_eq!(emb, emb2);

        // Different text should give different embedding
        let emb3 = embedder.embed("Different text").unwrap();
        assert_ne!(emb, emb3);
    }

    #[test]
    fn test_token_embedder() {
        let embedder = TokenEmbedder::new(config("token-model", 256));

        let text = "The quick brown fox jumps over the lazy dog";
        let emb = embedder.embed(text).unwrap();

        assert_eq!(emb.len(), 256);

        let similar_text = "The quick brown fox";
        let emb2 = embedder.embed(similar_text).unwrap();

        let dot_product: f32 = emb.iter().zip(emb2.iter()).map(|(a, b)| a * b).sum();
        assert!(dot_product > 0.1);
    }

    #[test]
    fn test_embed_many_matches_embed() {
        let embedder = TokenEmbedder::new(config("token-model", 64));

        let texts = vec!["text one", "text two", "text three"];
        let embeddings = embedder.embed_many(&texts).unwrap();

        assert_eq!(embeddings.len(), 3);
        for (text, emb) in texts.iter().zip(&embeddings) {
            assert_eq!(&embedder.embed(text).unwrap(), emb);
        }
    }

    #[test]
    fn test_input_too_long() {
        let mut cfg = config("token-model", 16);
        cfg.max_length = 10;
        let embedder = TokenEmbedder::new(cfg);

        let err = embedder.embed("this text is far too long").unwrap_err();
        assert!(matches!(err, RagError::InputTooLong { max: 10, .. }));
    }

    #[test]
    fn test_create_embedder_falls_back_to_token() {
        let mut cfg = config("whatever", 32);
        cfg.backend = "nonexistent".to_string();
        let embedder = create_embedder(&cfg).unwrap();
        assert_eq!(embedder.dimension(), 32);
    }

    #[test]
    fn test_model_name_names_backend() {
        let token = TokenEmbedder::new(config("minilm", 32));
        let mock = MockEmbedder::new(config("minilm", 32));

        assert_eq!(token.model_name(), "token:minilm");
        assert_eq!(mock.model_name(), "mock:minilm");
    }

    #[test]
    fn test_token_buckets_are_stable() {
        // Persisted indexes depend on these exact buckets
        let embedder = TokenEmbedder::new(EmbeddingConfig {
            dimension: 64,
            normalize: false,
            ..Default::default()
        });
        let emb = embedder.embed("sky").unwrap();
        let idx = (xxh3_64(b"sky") % 64) as usize;

        assert_eq!(emb[idx], 1.0);
        assert_eq!(emb.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_create_embedder_rejects_zero_dimension() {
        let cfg = config("m", 0);
        assert!(create_embedder(&cfg).is_err());
    }
}
