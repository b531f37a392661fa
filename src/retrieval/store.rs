//! On-disk index format
//!
//! An index directory holds `index.json` (metadata plus one record per entry)
//! and `documents.json` (the corpus). Records are backend independent, so an
//! index saved from a flat backend can be reloaded into HNSW and vice versa.

use crate::data::{InMemoryCorpus, Span};
use crate::embedding::{Embedder, Embedding};
use crate::error::{RagError, Result};
use crate::retrieval::{create_index, IndexConfig, IndexEntry, Metric, SharedIndex};
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const DOCUMENTS_FILE: &str = "documents.json";

/// One persisted index entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub document_id: String,
    /// Byte range of the chunk in its document
    pub chunk_offset: (usize, usize),
    pub vector: Embedding,
    pub metric: Metric,
    pub embedding_model: String,
}

/// Index metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub model_name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub num_entries: usize,
    pub backend: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    metadata: IndexMetadata,
    records: Vec<IndexRecord>,
}

/// Saves and loads an index directory
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn documents_path(&self) -> PathBuf {
        self.dir.join(DOCUMENTS_FILE)
    }

    /// Whether an index has been saved here
    pub fn exists(&self) -> bool {
        self.index_path().is_file()
    }

    /// Persist every live entry of `index`, tagged with `model_name`
    pub fn save(&self, index: &SharedIndex, model_name: &str) -> Result<IndexMetadata> {
        let metric = index.metric()?;
        let entries = index.entries()?;

        let records: Vec<IndexRecord> = entries
            .into_iter()
            .map(|e| IndexRecord {
                document_id: e.document_id,
                chunk_offset: (e.span.start, e.span.end),
                vector: e.vector,
                metric,
                embedding_model: model_name.to_string(),
            })
            .collect();

        let metadata = IndexMetadata {
            model_name: model_name.to_string(),
            dimension: index.dimension()?,
            metric,
            num_entries: records.len(),
            backend: index.backend()?,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let file = IndexFile {
            metadata: metadata.clone(),
            records,
        };
        write_atomic(&self.index_path(), &serde_json::to_vec(&file)?)?;

        tracing::debug!("Saved {} index records to {:?}", metadata.num_entries, self.index_path());
        Ok(metadata)
    }

    /// Read only the metadata of a saved index
    pub fn metadata(&self) -> Result<IndexMetadata> {
        Ok(self.read_file()?.metadata)
    }

    /// Load a saved index into a fresh backend chosen by `config`
    ///
    /// Fails with `ModelMismatch` if the index was built by a different
    /// embedding model, `MetricMismatch` if it used a different metric and
    /// `DimensionMismatch` if its vectors do not fit the embedder.
    pub fn load(&self, config: &IndexConfig, embedder: &dyn Embedder) -> Result<SharedIndex> {
        let file = self.read_file()?;
        let metadata = &file.metadata;

        check_compatible(&metadata.model_name, metadata.metric, config, embedder)?;
        if metadata.dimension != embedder.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: embedder.dimension(),
                actual: metadata.dimension,
            });
        }

        let mut entries = Vec::with_capacity(file.records.len());
        for record in file.records {
            check_compatible(&record.embedding_model, record.metric, config, embedder)?;
            let (start, end) = record.chunk_offset;
            entries.push(IndexEntry::new(record.document_id, Span::new(start, end), record.vector));
        }

        let mut index = create_index(config, embedder.dimension());
        index.insert_batch(entries)?;

        tracing::info!(
            "Loaded index: {} entries, model={}, metric={}",
            index.size(),
            metadata.model_name,
            metadata.metric
        );
        Ok(SharedIndex::new(index))
    }

    /// Load the saved index, or start an empty one if none exists yet
    pub fn open_or_create(&self, config: &IndexConfig, embedder: &dyn Embedder) -> Result<SharedIndex> {
        if self.exists() {
            self.load(config, embedder)
        } else {
            tracing::info!("No index at {:?}, starting empty", self.dir);
            Ok(SharedIndex::new(create_index(config, embedder.dimension())))
        }
    }

    pub fn save_corpus(&self, corpus: &InMemoryCorpus) -> Result<()> {
        corpus.save(&self.documents_path())
    }

    /// Load the saved corpus, or an empty one if none exists yet
    pub fn load_corpus(&self) -> Result<InMemoryCorpus> {
        let path = self.documents_path();
        if path.is_file() {
            InMemoryCorpus::load(&path)
        } else {
            Ok(InMemoryCorpus::new())
        }
    }

    fn read_file(&self) -> Result<IndexFile> {
        let path = self.index_path();
        let bytes = fs::read(&path)
            .map_err(|e| RagError::Storage(format!("failed to read {:?}: {}", path, e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn check_compatible(model: &str, metric: Metric, config: &IndexConfig, embedder: &dyn Embedder) -> Result<()> {
    if model != embedder.model_name() {
        return Err(RagError::ModelMismatch {
            expected: embedder.model_name().to_string(),
            found: model.to_string(),
        });
    }
    if metric != config.metric {
        return Err(RagError::MetricMismatch {
            expected: config.metric.to_string(),
            found: metric.to_string(),
        });
    }
    Ok(())
}
