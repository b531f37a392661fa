//! Persistent embedding cache
//!
//! SQLite-backed store of computed vectors keyed by text hash and model name,
//! plus an [`Embedder`] decorator that consults it before calling the model.

use crate::embedding::{Embedder, Embedding};
use crate::error::{RagError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Embedding cache backed by SQLite
pub struct EmbeddingCache {
    conn: Mutex<Connection>,
    model_name: String,
}

/// Cache statistics
#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub model_entries: usize,
    pub model_name: String,
}

impl EmbeddingCache {
    /// Open (or create) a cache database for `model_name`
    pub fn open(db_path: &Path, model_name: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS embeddings (
                id INTEGER PRIMARY KEY,
                text_hash TEXT NOT NULL,
                model_name TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(text_hash, model_name)
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            model_name: model_name.to_string(),
        })
    }

    fn hash_text(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    fn serialize_embedding(embedding: &Embedding) -> Vec<u8> {
        embedding.iter().flat_map(|&f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Result<Embedding> {
        if bytes.len() % 4 != 0 {
            return Err(RagError::Storage("invalid embedding bytes length".into()));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    /// Get an embedding from the cache
    pub fn get(&self, text: &str) -> Result<Option<Embedding>> {
        let conn = self.conn.lock()?;
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM embeddings WHERE text_hash = ?1 AND model_name = ?2",
                params![Self::hash_text(text), self.model_name],
                |row| row.get(0),
            )
            .optional()?;

        bytes.map(|b| Self::deserialize_embedding(&b)).transpose()
    }

    /// Store an embedding in the cache
    pub fn put(&self, text: &str, embedding: &Embedding) -> Result<()> {
        let created_at = chrono::Utc::now().timestamp();
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (text_hash, model_name, embedding, dimension, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Self::hash_text(text),
                self.model_name,
                Self::serialize_embedding(embedding),
                embedding.len() as i64,
                created_at
            ],
        )?;
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        let model: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE model_name = ?1",
            params![self.model_name],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            total_entries: total as usize,
            model_entries: model as usize,
            model_name: self.model_name.clone(),
        })
    }

    /// Clear all cached embeddings for the current model
    pub fn clear_model(&self) -> Result<usize> {
        let conn = self.conn.lock()?;
        Ok(conn.execute(
            "DELETE FROM embeddings WHERE model_name = ?1",
            params![self.model_name],
        )?)
    }
}

/// Embedder decorator that serves repeated texts from an [`EmbeddingCache`]
pub struct CachedEmbedder {
    inner: Box<dyn Embedder>,
    cache: EmbeddingCache,
}

impl CachedEmbedder {
    pub fn new(inner: Box<dyn Embedder>, db_path: &Path) -> Result<Self> {
        let cache = EmbeddingCache::open(db_path, inner.model_name())?;
        tracing::debug!("Embedding cache at {:?} for {}", db_path, inner.model_name());
        Ok(Self { inner, cache })
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn lookup(&self, text: &str) -> Result<Option<Embedding>> {
        Ok(self
            .cache
            .get(text)?
            .filter(|emb| emb.len() == self.inner.dimension()))
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(embedding) = self.lookup(text)? {
            tracing::debug!("Cache hit for text: {}", text.chars().take(50).collect::<String>());
            return Ok(embedding);
        }

        let embedding = self.inner.embed(text)?;
        self.cache.put(text, &embedding)?;
        Ok(embedding)
    }

    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut results: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<&str> = Vec::new();

        for text in texts {
            let hit = self.lookup(text)?;
            if hit.is_none() {
                missing.push(*text);
            }
            results.push(hit);
        }

        tracing::debug!("Embedding cache: {} hits, {} misses", texts.len() - missing.len(), missing.len());

        let mut computed = self.inner.embed_many(&missing)?.into_iter();
        for (text, slot) in texts.iter().zip(results.iter_mut()) {
            if slot.is_none() {
                let embedding = computed
                    .next()
                    .ok_or_else(|| RagError::Storage("embedder returned too few vectors".into()))?;
                self.cache.put(text, &embedding)?;
                *slot = Some(embedding);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
