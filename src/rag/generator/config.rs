//! Configuration for text generators
//!
//! Defines configuration structures for generator initialization
//! and sampling parameters for controlling generation behavior.

use serde::{Deserialize, Serialize};

/// Configuration for initializing a generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// "ollama" or "extractive"
    pub backend: String,

    /// Model identifier passed to the backend
    pub model: String,

    /// Base URL of the Ollama server
    pub base_url: String,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Characters of context quoted by the extractive backend
    pub excerpt_chars: usize,

    /// Default sampling parameters
    pub sampling: SamplingParams,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "llama3.2".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
            excerpt_chars: 300,
            sampling: SamplingParams::default(),
        }
    }
}

impl GeneratorConfig {
    /// Create a new generator config for the given model
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Default::default()
        }
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    /// Set the server URL
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Sampling parameters for text generation
///
/// Controls the randomness and length of generated text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Temperature (higher = more random, lower = more deterministic)
    /// Range: 0.0 to 2.0, default: 0.7
    pub temperature: f32,

    /// Top-p (nucleus sampling) - cumulative probability threshold
    /// Range: 0.0 to 1.0, default: 0.9
    pub top_p: f32,

    /// Maximum new tokens to generate
    pub max_new_tokens: usize,

    /// Stop sequences - generation stops when any of these are produced
    pub stop_sequences: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_new_tokens: 300,
            stop_sequences: vec![],
        }
    }
}

impl SamplingParams {
    /// Create greedy decoding parameters (deterministic)
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            ..Default::default()
        }
    }

    /// Create creative sampling parameters (more random)
    pub fn creative() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            ..Default::default()
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    /// Set top-p
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Set max new tokens
    pub fn with_max_new_tokens(mut self, max_tokens: usize) -> Self {
        self.max_new_tokens = max_tokens;
        self
    }

    /// Add stop sequences
    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = sequences;
        self
    }
}
