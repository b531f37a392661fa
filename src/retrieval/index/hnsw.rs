//! Approximate index using HNSW
//!
//! hnsw_rs graphs cannot remove points, so deletions are tombstones: the slot
//! is cleared and searches skip it. Once tombstones pass the configured
//! fraction of slots (or the graph runs out of capacity) the graph is rebuilt
//! from the live entries.
//!
//! The graph always uses L2 distance. For cosine indexes the inserted points
//! and queries are unit-normalised copies, which makes L2 order equal cosine
//! order. Candidates are re-scored exactly, so reported scores and tie order
//! match the flat index.

use super::{check_dimension, IndexConfig, VectorIndex};
use crate::embedding::{normalize_embedding, Embedding};
use crate::error::Result;
use crate::retrieval::{exact_top_k, rank_order, IndexEntry, Metric, RetrievalResult, ScoredEntry};
use hnsw_rs::prelude::*;

const MIN_CAPACITY: usize = 1024;
const MAX_LAYERS: usize = 16;

/// HNSW-backed approximate index
pub struct HnswIndex {
    config: IndexConfig,
    dimension: usize,
    graph: Hnsw<'static, f32, DistL2>,
    /// Graph point id -> entry; `None` marks a deleted point
    slots: Vec<Option<IndexEntry>>,
    live: usize,
    capacity: usize,
}

impl HnswIndex {
    pub fn new(dimension: usize, config: IndexConfig) -> Self {
        let graph = Self::new_graph(&config, MIN_CAPACITY);
        Self {
            config,
            dimension,
            graph,
            slots: Vec::new(),
            live: 0,
            capacity: MIN_CAPACITY,
        }
    }

    fn new_graph(config: &IndexConfig, capacity: usize) -> Hnsw<'static, f32, DistL2> {
        Hnsw::new(
            config.max_connections.max(2),
            capacity,
            config.max_layers.clamp(1, MAX_LAYERS),
            config.ef_construction.max(1),
            DistL2 {},
        )
    }

    fn prepare(&self, vector: &[f32]) -> Embedding {
        let mut point = vector.to_vec();
        if self.config.metric == Metric::Cosine {
            normalize_embedding(&mut point);
        }
        point
    }

    fn tombstones(&self) -> usize {
        self.slots.len() - self.live
    }

    /// Rebuild the graph from live entries, dropping tombstones
    fn rebuild(&mut self, capacity: usize) {
        let live: Vec<IndexEntry> = self.slots.drain(..).flatten().collect();
        tracing::debug!(
            "Rebuilding HNSW graph: {} live entries, capacity {}",
            live.len(),
            capacity
        );

        self.capacity = capacity.max(MIN_CAPACITY);
        self.graph = Self::new_graph(&self.config, self.capacity);
        self.live = 0;
        for entry in live {
            self.push(entry);
        }
    }

    fn push(&mut self, entry: IndexEntry) {
        let point_id = self.slots.len();
        let point = self.prepare(&entry.vector);
        self.graph.insert((point.as_slice(), point_id));
        self.slots.push(Some(entry));
        self.live += 1;
    }

    fn exact_scan(&self, query: &[f32], k: usize) -> RetrievalResult {
        exact_top_k(self.config.metric, query, self.slots.iter().flatten(), k)
    }

    fn score(&self, query: &[f32], entry: &IndexEntry) -> ScoredEntry {
        ScoredEntry {
            document_id: entry.document_id.clone(),
            span: entry.span,
            score: self.config.metric.similarity(query, &entry.vector),
        }
    }

    /// Fill the last places from every live entry scoring exactly the k-th
    /// score, so ties break by document id as in the flat index
    fn resolve_boundary_ties(&self, query: &[f32], hits: Vec<ScoredEntry>, k: usize) -> RetrievalResult {
        let boundary = hits[k - 1].score;
        let mut result: Vec<ScoredEntry> = hits.into_iter().filter(|h| h.score > boundary).collect();

        let mut tied: Vec<ScoredEntry> = self
            .slots
            .iter()
            .flatten()
            .map(|entry| self.score(query, entry))
            .filter(|hit| hit.score == boundary)
            .collect();
        tied.sort_by(rank_order);

        result.extend(tied);
        result.truncate(k);
        result
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&mut self, entry: IndexEntry) -> Result<()> {
        check_dimension(self.dimension, entry.vector.len())?;
        if self.slots.len() >= self.capacity {
            self.rebuild((self.live + 1) * 2);
        }
        self.push(entry);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        check_dimension(self.dimension, query.len())?;
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }

        // One candidate past k shows whether a tie crosses the cut
        let fetch = (k + 1 + self.tombstones()).min(self.slots.len());
        let ef = self.config.ef_search.max(fetch);
        let point = self.prepare(query);
        let neighbours = self.graph.search(point.as_slice(), fetch, ef);

        let mut hits: Vec<ScoredEntry> = neighbours
            .iter()
            .filter_map(|n| self.slots.get(n.d_id).and_then(Option::as_ref))
            .map(|entry| self.score(query, entry))
            .collect();
        hits.sort_by(rank_order);

        // The graph can miss reachable points on tiny or heavily tombstoned indexes
        let wanted = (k + 1).min(self.live);
        if hits.len() < wanted {
            tracing::debug!(
                "HNSW returned {} of {} results, falling back to exact scan",
                hits.len(),
                wanted
            );
            return Ok(self.exact_scan(query, k));
        }

        if hits.len() > k && hits[k].score == hits[k - 1].score {
            return Ok(self.resolve_boundary_ties(query, hits, k));
        }
        hits.truncate(k);
        Ok(hits)
    }

    fn delete(&mut self, document_id: &str) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.document_id == document_id) {
                *slot = None;
                removed += 1;
            }
        }
        self.live -= removed;

        let threshold = self.config.compaction_threshold.clamp(0.0, 1.0);
        if removed > 0 && self.tombstones() as f32 > threshold * self.slots.len() as f32 {
            self.rebuild(self.capacity);
        }
        removed
    }

    fn size(&self) -> usize {
        self.live
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> Metric {
        self.config.metric
    }

    fn entries(&self) -> Vec<IndexEntry> {
        self.slots.iter().flatten().cloned().collect()
    }

    fn name(&self) -> &str {
        "hnsw"
    }
}
