//! Vector index backends and the shared, lock-guarded handle
//!
//! Backends implement [`VectorIndex`] with plain `&mut self` mutation. Callers
//! go through [`SharedIndex`], which serialises mutations behind a write lock,
//! lets searches run in parallel under the read lock, and bumps a version
//! counter on every change so query caches can tell when they are stale.

use crate::error::{RagError, Result};
use crate::retrieval::{IndexEntry, Metric, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

mod flat;
#[cfg(feature = "hnsw")]
mod hnsw;

pub use flat::FlatIndex;
#[cfg(feature = "hnsw")]
pub use hnsw::HnswIndex;

/// Storage and k-NN search over embedding vectors
///
/// There is no in-place update: re-embedding a document is `delete` followed
/// by `insert`.
pub trait VectorIndex: Send + Sync {
    /// Add one entry. Fails with `DimensionMismatch` and leaves the index
    /// unchanged if the vector has the wrong length.
    fn insert(&mut self, entry: IndexEntry) -> Result<()>;

    /// Add several entries; all are validated before any is inserted
    fn insert_batch(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        for entry in &entries {
            check_dimension(self.dimension(), entry.vector.len())?;
        }
        for entry in entries {
            self.insert(entry)?;
        }
        Ok(())
    }

    /// Up to `k` entries most similar to `query`, in rank order
    fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult>;

    /// Remove every entry of a document, returning how many were removed
    fn delete(&mut self, document_id: &str) -> usize;

    /// Number of live entries
    fn size(&self) -> usize;

    fn dimension(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Copy of all live entries, in insertion order
    fn entries(&self) -> Vec<IndexEntry>;

    /// Backend name
    fn name(&self) -> &str;
}

/// Fail with `DimensionMismatch` unless `actual == expected`
pub fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Which index backend to build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// "flat" (exact) or "hnsw" (approximate)
    pub backend: String,
    pub metric: Metric,
    /// Maximum number of connections per layer
    pub max_connections: usize,
    /// Size of the dynamic candidate list during construction
    pub ef_construction: usize,
    /// Size of the dynamic candidate list during search
    pub ef_search: usize,
    /// Maximum number of layers
    pub max_layers: usize,
    /// Rebuild the graph once this fraction of points are deleted
    pub compaction_threshold: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: "flat".to_string(),
            metric: Metric::Cosine,
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layers: 16,
            compaction_threshold: 0.25,
        }
    }
}

/// Build an empty index for vectors of `dimension`
pub fn create_index(config: &IndexConfig, dimension: usize) -> Box<dyn VectorIndex> {
    match config.backend.as_str() {
        "flat" => Box::new(FlatIndex::new(dimension, config.metric)),
        #[cfg(feature = "hnsw")]
        "hnsw" => Box::new(HnswIndex::new(dimension, config.clone())),
        other => {
            tracing::warn!("Index backend '{}' not available, using flat", other);
            Box::new(FlatIndex::new(dimension, config.metric))
        }
    }
}

/// Thread-safe index handle shared by ingestion and query paths
pub struct SharedIndex {
    inner: RwLock<Box<dyn VectorIndex>>,
    version: AtomicU64,
}

impl std::fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedIndex")
            .field("size", &self.size())
            .field("version", &self.version())
            .finish()
    }
}

impl SharedIndex {
    pub fn new(index: Box<dyn VectorIndex>) -> Self {
        Self {
            inner: RwLock::new(index),
            version: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, entry: IndexEntry) -> Result<()> {
        let mut index = self.inner.write()?;
        index.insert(entry)?;
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn insert_batch(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut index = self.inner.write()?;
        index.insert_batch(entries)?;
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn delete(&self, document_id: &str) -> Result<usize> {
        let mut index = self.inner.write()?;
        let removed = index.delete(document_id);
        if removed > 0 {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        Ok(self.search_versioned(query, k)?.0)
    }

    /// Search and report the index version the result was computed against
    pub fn search_versioned(&self, query: &[f32], k: usize) -> Result<(RetrievalResult, u64)> {
        let index = self.inner.read()?;
        let version = self.version.load(Ordering::SeqCst);
        Ok((index.search(query, k)?, version))
    }

    /// Incremented after every successful mutation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.inner.read().map(|index| index.size()).unwrap_or(0)
    }

    pub fn dimension(&self) -> Result<usize> {
        Ok(self.inner.read()?.dimension())
    }

    pub fn metric(&self) -> Result<Metric> {
        Ok(self.inner.read()?.metric())
    }

    pub fn backend(&self) -> Result<String> {
        Ok(self.inner.read()?.name().to_string())
    }

    /// Consistent copy of all live entries
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.inner.read()?.entries())
    }
}
