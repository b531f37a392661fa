//! RAG (Retrieval-Augmented Generation) Pipeline
//!
//! # Architecture
//!
//! ```text
//! User Query
//!     │
//!     ▼
//! ┌─────────────┐
//! │  Retriever  │  ← embed query, k-NN search over the shared index
//! └─────────────┘
//!     │
//!     ▼ RetrievalResult
//! ┌─────────────┐
//! │   Context   │  ← resolve passages, dedup, fit the budget
//! │  Assembler  │
//! └─────────────┘
//!     │
//!     ▼ Prompt with [source: id] tags
//! ┌─────────────┐
//! │  Generator  │  ← Ollama or extractive
//! └─────────────┘
//!     │
//!     ▼
//! Answer (text + citations + context)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docqa::rag::{RagPipeline, RagQuery};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedder(embedder)
//!     .index(index)
//!     .corpus(corpus)
//!     .generator(generator)
//!     .build()?;
//!
//! let answer = pipeline.query(RagQuery::new("What color is the sky?").with_top_k(3))?;
//! println!("{}", answer);
//! ```

pub mod context;
pub mod generator;
pub mod ingest;
pub mod pipeline;
pub mod query;

// Re-exports for convenience
pub use context::{AssembledContext, ContextAssembler, ContextConfig, Passage, PromptTemplates, SizeUnit};
pub use generator::{create_generator, ExtractiveGenerator, Generator, GeneratorConfig, OllamaGenerator, SamplingParams};
pub use ingest::{IngestReport, Ingestor};
pub use pipeline::{extract_citations, RagConfig, RagPipeline, RagPipelineBuilder, NO_CONTEXT_ANSWER};
pub use query::{Answer, RagQuery, Stage, StageTimings};
