//! Query-side retrieval: embed the query, search the shared index

use crate::embedding::{Embedder, Embedding};
use crate::error::{RagError, Result};
use crate::retrieval::{RetrievalResult, SharedIndex};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Embedder + index, producing ranked results for a query
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    cache: Option<QueryCache>,
}

impl Retriever {
    /// Fails with `DimensionMismatch` if embedder and index disagree
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<SharedIndex>) -> Result<Self> {
        let dimension = index.dimension()?;
        if dimension != embedder.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: embedder.dimension(),
            });
        }
        Ok(Self {
            embedder,
            index,
            cache: None,
        })
    }

    /// Cache results of up to `capacity` distinct `(query, k)` pairs
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.cache = (capacity > 0).then(|| QueryCache::new(capacity));
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    pub fn embed_query(&self, query: &str) -> Result<Embedding> {
        self.embedder.embed(query)
    }

    /// Cached result for `(query, k)` if it was computed against the current index
    pub fn cached(&self, query: &str, k: usize) -> Option<RetrievalResult> {
        let cache = self.cache.as_ref()?;
        cache.get(query, k, self.index.version())
    }

    /// Search with an embedded query and remember the result for `query`
    pub fn search_and_cache(&self, query: &str, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        let (result, version) = self.index.search_versioned(vector, k)?;
        if let Some(cache) = &self.cache {
            cache.put(query, k, version, result.clone());
        }
        Ok(result)
    }

    /// Embed `query` and return the `k` best matches, unmodified
    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if let Some(hit) = self.cached(query, k) {
            tracing::debug!("Query cache hit (k={})", k);
            return Ok(hit);
        }
        let vector = self.embed_query(query)?;
        self.search_and_cache(query, &vector, k)
    }
}

/// FIFO-bounded map of `(query, k)` to results, tagged with the index version
pub struct QueryCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<(String, usize), (u64, RetrievalResult)>,
    order: VecDeque<(String, usize)>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Entries from an older index version are evicted and reported as misses
    pub fn get(&self, query: &str, k: usize, version: u64) -> Option<RetrievalResult> {
        let mut state = self.state.lock().ok()?;
        let key = (query.to_string(), k);
        let (cached_version, result) = state.entries.get(&key)?.clone();
        if cached_version == version {
            return Some(result);
        }
        state.entries.remove(&key);
        state.order.retain(|queued| queued != &key);
        None
    }

    pub fn put(&self, query: &str, k: usize, version: u64, result: RetrievalResult) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let key = (query.to_string(), k);
        if state.entries.insert(key.clone(), (version, result)).is_none() {
            state.order.push_back(key);
        }
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
