//! Generator module for text generation
//!
//! Trait-based abstraction over prompt-to-text models, with an Ollama HTTP
//! backend and an offline extractive backend.

pub mod config;
pub mod extractive;
pub mod ollama;

pub use config::{GeneratorConfig, SamplingParams};
pub use extractive::ExtractiveGenerator;
pub use ollama::OllamaGenerator;

use crate::error::Result;
use std::sync::Arc;

/// Trait for text generation models
pub trait Generator: Send + Sync {
    /// Generate a response given a prompt
    ///
    /// Fails with `ModelUnavailable` when the backend cannot be reached and
    /// `GenerationTimeout` when it does not answer in time.
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Factory function for creating generators
pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.backend.as_str() {
        "ollama" => Arc::new(OllamaGenerator::new(config.clone())?),
        "extractive" => Arc::new(ExtractiveGenerator::new(config.excerpt_chars)),
        other => {
            tracing::warn!("Unknown generator backend '{}', using extractive", other);
            Arc::new(ExtractiveGenerator::new(config.excerpt_chars))
        }
    };

    tracing::info!("Generator ready: {} (backend={})", generator.model_name(), config.backend);
    Ok(generator)
}
