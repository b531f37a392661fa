//! RAG query and answer types

use super::context::AssembledContext;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Embedding,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query input for the pipeline; unset fields use the pipeline defaults
#[derive(Debug, Clone)]
pub struct RagQuery {
    /// The user's question
    pub query: String,
    /// Number of passages to retrieve
    pub top_k: Option<usize>,
    /// Context budget in the configured unit
    pub budget: Option<usize>,
}

impl RagQuery {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            top_k: None,
            budget: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Wall-clock time spent in each stage, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub embedding_ms: u64,
    pub retrieval_ms: u64,
    pub assembly_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

/// Pipeline output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text
    pub text: String,
    /// Document ids backing the answer, without duplicates
    pub citations: Vec<String>,
    /// The passages the answer was generated from
    pub context: AssembledContext,
    pub timings: StageTimings,
}

impl Answer {
    /// True if the answer came from the generator rather than the fixed
    /// no-information reply
    pub fn is_grounded(&self) -> bool {
        !self.context.passages.is_empty()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Answer: {}", self.text)?;
        writeln!(f, "\nSources ({}):", self.context.passages.len())?;
        for (i, passage) in self.context.passages.iter().enumerate() {
            writeln!(
                f,
                "  [{}] {} {} (score: {:.4})",
                i + 1,
                passage.document_id,
                passage.span,
                passage.score
            )?;
        }
        if !self.citations.is_empty() {
            writeln!(f, "\nCitations: {}", self.citations.join(", "))?;
        }
        writeln!(
            f,
            "\nTiming: embedding={}ms, retrieval={}ms, assembly={}ms, generation={}ms, total={}ms",
            self.timings.embedding_ms,
            self.timings.retrieval_ms,
            self.timings.assembly_ms,
            self.timings.generation_ms,
            self.timings.total_ms
        )?;
        Ok(())
    }
}
