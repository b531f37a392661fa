//! Command-line interface
//!
//! Provides CLI commands for ingest, query, remove and stats. Model backends
//! use blocking HTTP clients, so each command body runs on tokio's blocking
//! pool.

use crate::config::Settings;
use crate::data::{create_chunker, CorpusStore, InMemoryCorpus, MultiFormatLoader};
use crate::embedding::{create_embedder, Embedder, EmbeddingCache};
use crate::rag::{create_generator, Ingestor, RagPipeline};
use crate::retrieval::{IndexStore, SharedIndex};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest question accepted from the command line, in characters
pub const MAX_QUESTION_CHARS: usize = 1000;

/// Reject empty or overly long questions
pub fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question cannot be empty");
    }
    let len = question.chars().count();
    if len > MAX_QUESTION_CHARS {
        bail!("Question too long: {} characters (limit {})", len, MAX_QUESTION_CHARS);
    }
    Ok(())
}

/// Embedder, index and corpus opened from an index directory
struct Workspace {
    store: IndexStore,
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    corpus: Arc<InMemoryCorpus>,
}

impl Workspace {
    /// Open the index directory, creating an empty index if `create` is set
    fn open(settings: &Settings, create: bool) -> Result<Self> {
        let index_dir = settings.index_dir()?;
        let store = IndexStore::new(&index_dir);
        if !create && !store.exists() {
            bail!(
                "No index found at {:?}; run `docqa ingest --input <path>` first",
                index_dir
            );
        }

        let embedder = create_embedder(&settings.embedding_config()?)?;
        let index = if create {
            store.open_or_create(&settings.retrieval, embedder.as_ref())?
        } else {
            store.load(&settings.retrieval, embedder.as_ref())?
        };
        let corpus = store.load_corpus()?;

        Ok(Self {
            store,
            embedder,
            index: Arc::new(index),
            corpus: Arc::new(corpus),
        })
    }

    fn ingestor(&self, settings: &Settings) -> Result<Ingestor> {
        let chunker = create_chunker(settings.chunking.clone())?;
        Ok(Ingestor::new(
            self.embedder.clone(),
            self.index.clone(),
            self.corpus.clone(),
            chunker,
        ))
    }

    fn save(&self) -> Result<()> {
        self.store
            .save(&self.index, self.embedder.model_name())
            .context("Failed to save index")?;
        self.store
            .save_corpus(&self.corpus)
            .context("Failed to save documents")?;
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.context("Command task panicked")?
}

/// Execute the ingest command
pub async fn ingest(settings: Settings, input: PathBuf) -> Result<()> {
    blocking(move || ingest_blocking(&settings, &input)).await
}

fn ingest_blocking(settings: &Settings, input: &Path) -> Result<()> {
    tracing::info!("Starting ingestion");
    tracing::info!("  Input: {:?}", input);
    tracing::info!("  Index: {:?}", settings.index_dir()?);
    tracing::info!(
        "  Chunking: {} (size={}, overlap={})",
        settings.chunking.strategy,
        settings.chunking.chunk_size,
        settings.chunking.chunk_overlap
    );

    let loader = MultiFormatLoader::new();
    let (documents, load_failures) = if input.is_file() {
        (vec![loader.load(input)?], Vec::new())
    } else if input.is_dir() {
        let loaded = loader.load_directory(input)?;
        (loaded.documents, loaded.failures)
    } else {
        bail!("Input path does not exist: {:?}", input);
    };
    tracing::info!("Loaded {} documents", documents.len());

    let workspace = Workspace::open(settings, true)?;
    let report = workspace.ingestor(settings)?.add_documents(documents)?;
    workspace.save()?;

    println!("\nIngestion Summary:");
    println!("  Documents indexed: {}", report.indexed.len());
    println!("  Entries added: {}", report.entries_added());
    println!("  Index size: {}", workspace.index.size());
    println!("  Documents in corpus: {}", workspace.corpus.len());

    let failures = load_failures.len() + report.failures.len();
    if failures > 0 {
        println!("\n  Failed ({}):", failures);
        for (id, reason) in &load_failures {
            println!("    {}: {}", id, reason);
        }
        for (id, err) in &report.failures {
            println!("    {}: {}", id, err);
        }
    }

    Ok(())
}

/// Execute the query command
pub async fn query(settings: Settings, question: String, top_k: Option<usize>, budget: Option<usize>) -> Result<()> {
    validate_question(&question)?;
    blocking(move || query_blocking(&settings, &question, top_k, budget)).await
}

fn query_blocking(settings: &Settings, question: &str, top_k: Option<usize>, budget: Option<usize>) -> Result<()> {
    let workspace = Workspace::open(settings, false)?;
    let generator = create_generator(&settings.generation)?;

    let pipeline = RagPipeline::builder()
        .embedder(workspace.embedder.clone())
        .index(workspace.index.clone())
        .corpus(workspace.corpus.clone())
        .generator(generator)
        .config(settings.pipeline.clone())
        .context_config(settings.context.clone())
        .sampling(settings.generation.sampling.clone())
        .build()?;

    let k = top_k.unwrap_or(settings.pipeline.default_k);
    let budget = budget.unwrap_or(settings.pipeline.default_budget);
    tracing::info!("Query: {} (k={}, budget={})", question, k, budget);

    let answer = pipeline.answer(question, k, budget)?;
    println!("\n{}", answer);

    Ok(())
}

/// Execute the remove command
pub async fn remove(settings: Settings, document: String) -> Result<()> {
    blocking(move || remove_blocking(&settings, &document)).await
}

fn remove_blocking(settings: &Settings, document: &str) -> Result<()> {
    let workspace = Workspace::open(settings, false)?;
    if !workspace.corpus.contains(document) {
        bail!("Document not found: {}", document);
    }

    let removed = workspace.ingestor(settings)?.remove_document(document)?;
    workspace.save()?;

    println!("Removed '{}' ({} index entries)", document, removed);
    Ok(())
}

/// Execute the stats command
pub async fn stats(settings: Settings) -> Result<()> {
    blocking(move || stats_blocking(&settings)).await
}

fn stats_blocking(settings: &Settings) -> Result<()> {
    let index_dir = settings.index_dir()?;
    let store = IndexStore::new(&index_dir);
    if !store.exists() {
        println!("No index at {:?}", index_dir);
        return Ok(());
    }

    let metadata = store.metadata()?;
    let corpus = store.load_corpus()?;

    println!("\nIndex: {:?}", index_dir);
    println!("  Entries: {}", metadata.num_entries);
    println!("  Documents: {}", corpus.len());
    println!("  Embedding model: {}", metadata.model_name);
    println!("  Dimension: {}", metadata.dimension);
    println!("  Metric: {}", metadata.metric);
    println!("  Saved from backend: {}", metadata.backend);
    println!("  Saved at: {}", metadata.created_at);

    let cache_path = settings.embedding_config()?.cache_path;
    if let Some(path) = cache_path.filter(|p| p.is_file()) {
        let cache = EmbeddingCache::open(&path, &metadata.model_name)?;
        let stats = cache.stats()?;
        println!(
            "  Embedding cache: {} entries for {} ({} total)",
            stats.model_entries, stats.model_name, stats.total_entries
        );
    }

    Ok(())
}
