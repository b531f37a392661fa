//! Corpus store
//!
//! The source of truth for document text. The core only needs lookups by id;
//! the in-memory store is what the CLI and tests use.

use crate::data::Document;
use crate::error::Result;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Read access to documents by id
pub trait CorpusStore: Send + Sync {
    /// Fetch a document
    fn get(&self, document_id: &str) -> Option<Arc<Document>>;

    /// Whether a document exists
    fn contains(&self, document_id: &str) -> bool {
        self.get(document_id).is_some()
    }

    /// Number of documents
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe in-memory corpus keyed by document id
#[derive(Default)]
pub struct InMemoryCorpus {
    documents: RwLock<BTreeMap<String, Arc<Document>>>,
}

#[derive(Serialize, Deserialize)]
struct CorpusFile {
    documents: Vec<Document>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document, returning the previous version
    pub fn insert(&self, document: Document) -> Result<Option<Arc<Document>>> {
        let mut docs = self.documents.write()?;
        Ok(docs.insert(document.id.clone(), Arc::new(document)))
    }

    /// Remove a document
    pub fn remove(&self, document_id: &str) -> Result<Option<Arc<Document>>> {
        let mut docs = self.documents.write()?;
        Ok(docs.remove(document_id))
    }

    /// Document ids in ascending order
    pub fn ids(&self) -> Vec<String> {
        self.documents
            .read()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Save all documents as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let documents = {
            let docs = self.documents.read()?;
            docs.values().map(|d| d.as_ref().clone()).collect()
        };
        let json = serde_json::to_string_pretty(&CorpusFile { documents })?;
        write_atomic(path, json.as_bytes())?;
        tracing::debug!("Corpus saved to {:?}", path);
        Ok(())
    }

    /// Load documents saved by [`InMemoryCorpus::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let file: CorpusFile = serde_json::from_str(&json)?;
        let corpus = Self::new();
        for doc in file.documents {
            corpus.insert(doc)?;
        }
        tracing::debug!("Corpus loaded from {:?} ({} documents)", path, corpus.len());
        Ok(corpus)
    }
}

impl CorpusStore for InMemoryCorpus {
    fn get(&self, document_id: &str) -> Option<Arc<Document>> {
        self.documents.read().ok()?.get(document_id).cloned()
    }

    fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }
}
