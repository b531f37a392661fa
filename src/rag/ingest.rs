//! Document ingestion: chunk, embed, index

use crate::data::{Chunker, CorpusStore, Document, InMemoryCorpus};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::retrieval::{check_dimension, IndexEntry, SharedIndex};
use std::sync::Arc;

/// Outcome of a batch ingestion
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents indexed, with the number of entries each produced
    pub indexed: Vec<(String, usize)>,
    /// Documents that could not be indexed
    pub failures: Vec<(String, RagError)>,
}

impl IngestReport {
    pub fn entries_added(&self) -> usize {
        self.indexed.iter().map(|(_, n)| n).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Adds documents to the corpus and the index together
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    corpus: Arc<InMemoryCorpus>,
    chunker: Box<dyn Chunker>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<SharedIndex>,
        corpus: Arc<InMemoryCorpus>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            embedder,
            index,
            corpus,
            chunker,
        }
    }

    /// Chunk, embed and index one document
    ///
    /// Re-adding an existing id replaces its text and entries. Nothing is
    /// mutated until every chunk has been embedded and checked.
    pub fn add_document(&self, document: Document) -> Result<Vec<IndexEntry>> {
        if document.id.trim().is_empty() {
            return Err(RagError::InvalidInput("document id is empty".to_string()));
        }

        let chunks = self.chunker.chunk(&document)?;
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "document '{}' has no indexable text",
                document.id
            )));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_many(&texts)?;
        let dimension = self.index.dimension()?;
        for vector in &vectors {
            check_dimension(dimension, vector.len())?;
        }

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(&document.id, chunk.span, vector))
            .collect();

        let id = document.id.clone();
        let previous_entries: Vec<IndexEntry> = if self.corpus.contains(&id) {
            self.index
                .entries()?
                .into_iter()
                .filter(|entry| entry.document_id == id)
                .collect()
        } else {
            Vec::new()
        };

        // Old entries go first so no search resolves them against the new text
        let replaced = self.index.delete(&id)?;
        let previous = self.corpus.insert(document)?;
        if let Err(e) = self.index.insert_batch(entries.clone()) {
            if let Err(restore_err) = self.restore(&id, previous, previous_entries) {
                tracing::error!("Could not restore '{}' after failed insert: {}", id, restore_err);
            }
            return Err(e);
        }

        if replaced > 0 {
            tracing::info!("Replaced '{}': {} -> {} entries", id, replaced, entries.len());
        } else {
            tracing::debug!("Indexed '{}' as {} entries", id, entries.len());
        }
        Ok(entries)
    }

    /// Put back the version of a document that a failed re-add displaced
    fn restore(&self, id: &str, previous: Option<Arc<Document>>, entries: Vec<IndexEntry>) -> Result<()> {
        self.index.delete(id)?;
        match previous {
            Some(document) => {
                self.corpus.insert(document.as_ref().clone())?;
            }
            None => {
                self.corpus.remove(id)?;
            }
        }
        self.index.insert_batch(entries)
    }

    /// Add many documents, isolating per-document failures
    ///
    /// Configuration errors (`DimensionMismatch` and friends) mean every later
    /// document would fail the same way, so they halt the batch.
    pub fn add_documents(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let total = documents.len();

        for document in documents {
            let id = document.id.clone();
            match self.add_document(document) {
                Ok(entries) => report.indexed.push((id, entries.len())),
                Err(e) if e.is_fatal() => {
                    tracing::error!("Halting ingestion at '{}': {}", id, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Skipping '{}': {}", id, e);
                    report.failures.push((id, e));
                }
            }
        }

        tracing::info!(
            "Ingested {}/{} documents ({} entries)",
            report.indexed.len(),
            total,
            report.entries_added()
        );
        Ok(report)
    }

    /// Remove a document and all of its entries, returning the entry count
    pub fn remove_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.index.delete(document_id)?;
        self.corpus.remove(document_id)?;
        tracing::debug!("Removed '{}' ({} entries)", document_id, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{create_chunker, ChunkConfig};
    use crate::embedding::{EmbeddingConfig, MockEmbedder, TokenEmbedder};
    use crate::retrieval::{create_index, FlatIndex, IndexConfig, Metric, RetrievalResult, VectorIndex};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn chunker() -> Box<dyn Chunker> {
        create_chunker(ChunkConfig {
            chunk_size: 40,
            chunk_overlap: 10,
            ..Default::default()
        })
        .unwrap()
    }

    fn token_embedder() -> Arc<dyn Embedder> {
        Arc::new(TokenEmbedder::new(EmbeddingConfig {
            dimension: 64,
            max_length: 100,
            ..Default::default()
        }))
    }

    fn ingestor_with(embedder: Arc<dyn Embedder>, index_dimension: usize) -> Ingestor {
        let index = Arc::new(SharedIndex::new(create_index(&IndexConfig::default(), index_dimension)));
        Ingestor::new(embedder, index, Arc::new(InMemoryCorpus::new()), chunker())
    }

    fn ingestor() -> Ingestor {
        ingestor_with(token_embedder(), 64)
    }

    /// Flat index whose next insert fails once armed
    struct FailOnce {
        inner: FlatIndex,
        armed: Arc<AtomicBool>,
    }

    impl VectorIndex for FailOnce {
        fn insert(&mut self, entry: IndexEntry) -> Result<()> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(RagError::Internal("disk full".to_string()));
            }
            self.inner.insert(entry)
        }

        fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
            self.inner.search(query, k)
        }

        fn delete(&mut self, document_id: &str) -> usize {
            self.inner.delete(document_id)
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn metric(&self) -> Metric {
            self.inner.metric()
        }

        fn entries(&self) -> Vec<IndexEntry> {
            self.inner.entries()
        }

        fn name(&self) -> &str {
            "fail-once"
        }
    }

    #[test]
    fn test_add_document_indexes_chunks() {
        let ingestor = ingestor();
        let text = "The sky is blue. Grass is green. The sun is bright. Snow is white.";
        let entries = ingestor.add_document(Document::new("doc1", text)).unwrap();

        assert!(entries.len() > 1);
        assert_eq!(ingestor.index.size(), entries.len());
        assert!(ingestor.corpus.contains("doc1"));
        for entry in &entries {
            assert!(text.get(entry.span.start..entry.span.end).is_some());
        }
    }

    #[test]
    fn test_readd_replaces_entries() {
        let ingestor = ingestor();
        ingestor
            .add_document(Document::new("doc1", "The sky is blue. Grass is green. The sun is bright."))
            .unwrap();
        let entries = ingestor.add_document(Document::new("doc1", "Short now.")).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(ingestor.index.size(), 1);
        assert_eq!(ingestor.corpus.get("doc1").unwrap().text, "Short now.");
    }

    #[test]
    fn test_failed_readd_keeps_previous_version() {
        let armed = Arc::new(AtomicBool::new(false));
        let index = Arc::new(SharedIndex::new(Box::new(FailOnce {
            inner: FlatIndex::new(64, Metric::Cosine),
            armed: armed.clone(),
        })));
        let corpus = Arc::new(InMemoryCorpus::new());
        let embedder = token_embedder();
        let ingestor = Ingestor::new(embedder.clone(), index.clone(), corpus.clone(), chunker());

        ingestor.add_document(Document::new("doc1", "The sky is blue.")).unwrap();
        armed.store(true, Ordering::SeqCst);
        let err = ingestor
            .add_document(Document::new("doc1", "Grass is green."))
            .unwrap_err();

        assert!(matches!(err, RagError::Internal(_)));
        assert_eq!(corpus.get("doc1").unwrap().text, "The sky is blue.");
        assert_eq!(index.size(), 1);
        let query = embedder.embed("The sky is blue.").unwrap();
        assert_eq!(index.search(&query, 1).unwrap()[0].document_id, "doc1");
    }

    #[test]
    fn test_failed_first_add_leaves_nothing() {
        let armed = Arc::new(AtomicBool::new(true));
        let index = Arc::new(SharedIndex::new(Box::new(FailOnce {
            inner: FlatIndex::new(64, Metric::Cosine),
            armed,
        })));
        let corpus = Arc::new(InMemoryCorpus::new());
        let ingestor = Ingestor::new(token_embedder(), index.clone(), corpus.clone(), chunker());

        assert!(ingestor.add_document(Document::new("doc1", "The sky is blue.")).is_err());
        assert!(!corpus.contains("doc1"));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_remove_document() {
        let ingestor = ingestor();
        ingestor.add_document(Document::new("doc1", "The sky is blue.")).unwrap();
        ingestor.add_document(Document::new("doc2", "Grass is green.")).unwrap();

        assert_eq!(ingestor.remove_document("doc1").unwrap(), 1);
        assert!(!ingestor.corpus.contains("doc1"));
        assert!(ingestor
            .index
            .entries()
            .unwrap()
            .iter()
            .all(|e| e.document_id == "doc2"));
        assert_eq!(ingestor.remove_document("doc1").unwrap(), 0);
    }

    #[test]
    fn test_batch_isolates_bad_documents() {
        let ingestor = ingestor();
        let report = ingestor
            .add_documents(vec![
                Document::new("good1", "The sky is blue."),
                Document::new("empty", "   "),
                Document::new("good2", "Grass is green."),
            ])
            .unwrap();

        assert_eq!(report.indexed.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "empty");
        assert!(!report.is_complete());
        assert!(!ingestor.corpus.contains("empty"));
    }

    #[test]
    fn test_dimension_mismatch_halts_batch() {
        let embedder = Arc::new(MockEmbedder::new(EmbeddingConfig {
            dimension: 32,
            ..Default::default()
        }));
        let ingestor = ingestor_with(embedder, 64);

        let err = ingestor
            .add_documents(vec![
                Document::new("doc1", "The sky is blue."),
                Document::new("doc2", "Grass is green."),
            ])
            .unwrap_err();

        assert!(matches!(err, RagError::DimensionMismatch { expected: 64, actual: 32 }));
        assert_eq!(ingestor.index.size(), 0);
        assert!(ingestor.corpus.is_empty());
    }
}
