//! Error taxonomy
//!
//! Component-level failures are [`RagError`]; the pipeline wraps them in a
//! [`PipelineError`] that records which stage of the request failed.

use std::time::Duration;

use crate::rag::Stage;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors raised by embedders, indexes, generators and the stores around them
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Embedding or generation backend unreachable or not loaded
    #[error("model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Input longer than the model accepts; the caller must chunk first
    #[error("input too long: {len} characters exceeds the model limit of {max}")]
    InputTooLong { len: usize, max: usize },

    /// Vector length differs from the index/embedder dimensionality
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The whole request exceeded its deadline
    #[error("request timed out after {elapsed:?}")]
    RequestTimeout { elapsed: Duration },

    /// The generation backend did not answer in time
    #[error("generation timed out after {timeout:?}")]
    GenerationTimeout { timeout: Duration },

    /// A persisted index was produced by a different embedding model
    #[error("index was built with embedding model '{found}', but '{expected}' is configured")]
    ModelMismatch { expected: String, found: String },

    /// A persisted index uses a different similarity metric
    #[error("index uses metric '{found}', but '{expected}' is configured")]
    MetricMismatch { expected: String, found: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    /// Build a `ModelUnavailable` error
    pub fn unavailable(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// Only backend unavailability is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }

    /// Configuration errors that must stop ingestion altogether
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::ModelMismatch { .. } | Self::MetricMismatch { .. }
        )
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {}", e))
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(format!("sqlite: {}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for RagError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Lock(e.to_string())
    }
}

/// A failed request, tagged with the stage that failed
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: RagError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: RagError) -> Self {
        Self { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RagError::unavailable("m", "down").is_retryable());
        assert!(!RagError::InputTooLong { len: 10, max: 5 }.is_retryable());
        assert!(!RagError::GenerationTimeout {
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RagError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_fatal());
        assert!(!RagError::unavailable("m", "down").is_fatal());
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError::new(Stage::Generating, RagError::unavailable("llama3.2", "refused"));
        let msg = err.to_string();
        assert!(msg.contains("generating"));
        assert!(msg.contains("llama3.2"));
    }
}
