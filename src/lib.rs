//! # docqa
//!
//! Document question answering over a local corpus: Retrieval-Augmented
//! Generation with grounded, cited answers.
//!
//! ## Overview
//!
//! - Document loading and sentence-aware chunking
//! - Embedding generation (hashed bag-of-words or Ollama) with SQLite caching
//! - Exact and HNSW vector indexes behind a shared, versioned handle
//! - Budgeted context assembly with per-document deduplication
//! - Generation via Ollama, with retries, timeouts and citation extraction
//!
//! ## Architecture
//!
//! - `data` - Documents, corpus store, loaders and chunkers
//! - `embedding` - Embedders and the embedding cache
//! - `retrieval` - Vector indexes, persistence and the retriever
//! - `rag` - Context assembly, generators, ingestion and the pipeline
//! - `config` - Layered settings
//! - `cli` - Command-line interface
//! - `utils` - Common utilities

pub mod cli;
pub mod config;
pub mod data;
pub mod embedding;
pub mod error;
pub mod rag;
pub mod retrieval;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::{PipelineError, RagError, Result};
pub use rag::{Answer, RagPipeline, Stage};
