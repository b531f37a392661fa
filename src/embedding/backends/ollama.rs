//! Ollama embedding backend
//!
//! Calls `POST /api/embeddings` on a local Ollama server.

use crate::embedding::{check_input_length, model_id, normalize_embedding, Embedder, Embedding, EmbeddingConfig};
use crate::error::{RagError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedder backed by an Ollama server
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    config: EmbeddingConfig,
    model_id: String,
}

impl OllamaEmbedder {
    /// Create a client for the configured server; no request is made yet
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::unavailable(&config.model_name, e))?;
        let endpoint = format!("{}/api/embeddings", config.base_url.trim_end_matches('/'));

        tracing::debug!("Ollama embedder endpoint: {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            model_id: model_id("ollama", &config.model_name),
            config,
        })
    }

    fn request(&self, text: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.config.model_name,
                prompt: text,
            })
            .send()
            .map_err(|e| RagError::unavailable(&self.config.model_name, e))?;

        if !response.status().is_success() {
            return Err(RagError::unavailable(
                &self.config.model_name,
                format!("HTTP {}", response.status()),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| RagError::unavailable(&self.config.model_name, format!("bad response: {}", e)))?;

        if body.embedding.len() != self.config.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.config.dimension,
                actual: body.embedding.len(),
            });
        }

        let mut embedding = body.embedding;
        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }
        Ok(embedding)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        check_input_length(text, self.config.max_length)?;
        self.request(text)
    }

    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        // Validate everything up front so a long input fails before any request
        for text in texts {
            check_input_length(text, self.config.max_length)?;
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            tracing::debug!("Embedding batch of {} texts", batch.len());
            for text in batch {
                embeddings.push(self.request(text)?);
            }
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_server_is_model_unavailable() {
        let config = EmbeddingConfig {
            backend: "ollama".to_string(),
            // Port 9 (discard) on localhost is not an Ollama server
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(config).unwrap();

        let err = embedder.embed("hello").unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_long_input_rejected_before_request() {
        let config = EmbeddingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_length: 4,
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(config).unwrap();

        let err = embedder.embed_many(&["ok", "too long"]).unwrap_err();
        assert!(matches!(err, RagError::InputTooLong { .. }));
    }
}
