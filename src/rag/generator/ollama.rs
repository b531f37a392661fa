//! Ollama generation backend
//!
//! Non-streaming `POST /api/generate` against a local Ollama server.

use super::{Generator, GeneratorConfig, SamplingParams};
use crate::error::{RagError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    top_p: f32,
    num_predict: usize,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generator backed by an Ollama server
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    timeout: Duration,
    config: GeneratorConfig,
}

impl OllamaGenerator {
    /// Create a client for the configured server; no request is made yet
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::unavailable(&config.model, e))?;
        let endpoint = format!("{}/api/generate", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            timeout,
            config,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            RagError::GenerationTimeout { timeout: self.timeout }
        } else {
            RagError::unavailable(&self.config.model, e)
        }
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_new_tokens,
                stop: &params.stop_sequences,
            },
        };

        tracing::debug!("Ollama generate: model={}, prompt_chars={}", self.config.model, prompt.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(RagError::unavailable(
                &self.config.model,
                format!("HTTP {}", response.status()),
            ));
        }

        let body: GenerateResponse = response.json().map_err(|e| self.map_error(e))?;
        let text = body.response.trim();
        if text.is_empty() {
            return Err(RagError::unavailable(&self.config.model, "empty response"));
        }
        Ok(text.to_string())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
