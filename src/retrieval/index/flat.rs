//! Exact brute-force index

use super::{check_dimension, VectorIndex};
use crate::error::Result;
use crate::retrieval::{exact_top_k, IndexEntry, Metric, RetrievalResult};

/// Linear-scan index; every search scores every entry
pub struct FlatIndex {
    dimension: usize,
    metric: Metric,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            entries: Vec::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, entry: IndexEntry) -> Result<()> {
        check_dimension(self.dimension, entry.vector.len())?;
        self.entries.push(entry);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        check_dimension(self.dimension, query.len())?;
        Ok(exact_top_k(self.metric, query, &self.entries, k))
    }

    fn delete(&mut self, document_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.document_id != document_id);
        before - self.entries.len()
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn entries(&self) -> Vec<IndexEntry> {
        self.entries.clone()
    }

    fn name(&self) -> &str {
        "flat"
    }
}
