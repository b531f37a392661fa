//! RAG Pipeline orchestration
//!
//! Coordinates retrieval, context assembly and generation for one question.
//! Each request runs on its own worker thread so the per-request timeout can
//! abandon it; the pipeline itself holds no per-request state.

use crate::data::CorpusStore;
use crate::embedding::Embedder;
use crate::error::{PipelineError, RagError, Result};
use crate::retrieval::{Retriever, SharedIndex};
use crate::utils::backoff_delay;
use serde::{Deserialize, Serialize};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::context::{AssembledContext, ContextAssembler, ContextConfig, PromptTemplates};
use super::generator::{Generator, SamplingParams};
use super::query::{Answer, RagQuery, Stage, StageTimings};

/// Reply used when retrieval finds nothing to answer from
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant information in the uploaded documents \
to answer your question. Please make sure you've uploaded relevant documents or try rephrasing your question.";

/// Configuration for the RAG pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Passages retrieved when the caller does not say
    pub default_k: usize,

    /// Context budget when the caller does not say, in the context unit
    pub default_budget: usize,

    /// Extra attempts per model call after `ModelUnavailable`
    pub max_retries: u32,

    /// First retry delay; doubles per attempt
    pub retry_backoff_ms: u64,

    /// Upper bound on a single retry delay
    pub max_backoff_ms: u64,

    /// Deadline for a whole request; 0 disables it
    pub request_timeout_ms: u64,

    /// Answer with [`NO_CONTEXT_ANSWER`] instead of generating when no
    /// passage survives retrieval and assembly
    pub short_circuit_on_empty: bool,

    /// Drop hits scoring below this before assembly
    pub min_score: Option<f32>,

    /// Distinct `(query, k)` results to cache; 0 disables the cache
    pub query_cache_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            default_budget: 1500,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            request_timeout_ms: 60_000,
            short_circuit_on_empty: true,
            min_score: None,
            query_cache_size: 0,
        }
    }
}

impl RagConfig {
    /// Set the default number of passages
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.default_k = top_k;
        self
    }

    /// Set the default context budget
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.default_budget = budget;
        self
    }

    /// Set retry count and initial backoff
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the per-request deadline (`None` disables it)
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
        self
    }

    /// Set the empty-context behaviour
    pub fn with_short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit_on_empty = enabled;
        self
    }

    /// Set the similarity floor
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Enable the query cache
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.query_cache_size = capacity;
        self
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// RAG Pipeline for document question-answering
///
/// Cheap to share: clone it or wrap it in an `Arc` and call
/// [`answer`](Self::answer) from any number of threads.
#[derive(Clone)]
pub struct RagPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    retriever: Retriever,
    corpus: Arc<dyn CorpusStore>,
    generator: Arc<dyn Generator>,
    assembler: ContextAssembler,
    sampling: SamplingParams,
    config: RagConfig,
}

/// Stage a request is in, shared with the caller waiting on it
type Progress = Mutex<Stage>;

fn current_stage(progress: &Progress) -> Stage {
    progress.lock().map(|s| *s).unwrap_or(Stage::Failed)
}

fn set_stage(progress: &Progress, stage: Stage) {
    if let Ok(mut current) = progress.lock() {
        *current = stage;
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::new()
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.inner.retriever
    }

    /// Answer `query` from the `k` best passages within `budget`
    ///
    /// Failures name the stage that failed. If the request deadline passes,
    /// the error is `RequestTimeout` tagged with the stage in progress and the
    /// worker's eventual result is discarded.
    pub fn answer(&self, query: &str, k: usize, budget: usize) -> std::result::Result<Answer, PipelineError> {
        let span = tracing::info_span!("rag_request", query_len = query.chars().count(), k, budget);
        let _guard = span.enter();
        let started = Instant::now();

        if query.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Idle,
                RagError::InvalidInput("query is empty".to_string()),
            ));
        }

        let Some(timeout) = self.inner.config.request_timeout() else {
            return self.inner.run(query, k, budget, started, None, &Mutex::new(Stage::Idle));
        };

        let deadline = started + timeout;
        let progress = Arc::new(Mutex::new(Stage::Idle));
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&self.inner);
        let worker_progress = Arc::clone(&progress);
        let worker_span = span.clone();
        let owned_query = query.to_string();
        thread::Builder::new()
            .name("docqa-request".to_string())
            .spawn(move || {
                let _guard = worker_span.enter();
                let result = inner.run(&owned_query, k, budget, started, Some(deadline), &worker_progress);
                // The receiver is gone if the request already timed out
                let _ = tx.send(result);
            })
            .map_err(|e| {
                PipelineError::new(Stage::Idle, RagError::Internal(format!("failed to spawn request worker: {}", e)))
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let stage = current_stage(&progress);
                if matches!(stage, Stage::Done | Stage::Failed) {
                    // Finished right at the deadline; the result is already on its way
                    if let Ok(result) = rx.recv() {
                        return result;
                    }
                }
                tracing::warn!("Request timed out after {:?} in {} stage", timeout, stage);
                Err(PipelineError::new(
                    stage,
                    RagError::RequestTimeout {
                        elapsed: started.elapsed(),
                    },
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::new(
                current_stage(&progress),
                RagError::Internal("request worker exited without a result".to_string()),
            )),
        }
    }

    /// Answer with the configured default k and budget
    pub fn answer_default(&self, query: &str) -> std::result::Result<Answer, PipelineError> {
        self.answer(query, self.inner.config.default_k, self.inner.config.default_budget)
    }

    /// Answer a [`RagQuery`], filling unset fields from the configuration
    pub fn query(&self, query: RagQuery) -> std::result::Result<Answer, PipelineError> {
        let k = query.top_k.unwrap_or(self.inner.config.default_k);
        let budget = query.budget.unwrap_or(self.inner.config.default_budget);
        self.answer(&query.query, k, budget)
    }
}

impl PipelineInner {
    fn run(
        &self,
        query: &str,
        k: usize,
        budget: usize,
        started: Instant,
        deadline: Option<Instant>,
        progress: &Progress,
    ) -> std::result::Result<Answer, PipelineError> {
        let result = self.run_stages(query, k, budget, started, deadline, progress);
        match &result {
            Ok(_) => set_stage(progress, Stage::Done),
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                set_stage(progress, Stage::Failed);
            }
        }
        result
    }

    fn run_stages(
        &self,
        query: &str,
        k: usize,
        budget: usize,
        started: Instant,
        deadline: Option<Instant>,
        progress: &Progress,
    ) -> std::result::Result<Answer, PipelineError> {
        let mut timings = StageTimings::default();

        // Embedding + retrieval, unless the query cache already has the answer
        enter(Stage::Embedding, progress, started, deadline)?;
        let mut results = match self.retriever.cached(query, k) {
            Some(hit) => {
                tracing::debug!("Query cache hit");
                enter(Stage::Retrieving, progress, started, deadline)?;
                hit
            }
            None => {
                let t = Instant::now();
                let vector = self
                    .with_retry(deadline, || self.retriever.embed_query(query))
                    .map_err(|e| PipelineError::new(Stage::Embedding, e))?;
                timings.embedding_ms = elapsed_ms(t);

                enter(Stage::Retrieving, progress, started, deadline)?;
                let t = Instant::now();
                let results = self
                    .retriever
                    .search_and_cache(query, &vector, k)
                    .map_err(|e| PipelineError::new(Stage::Retrieving, e))?;
                timings.retrieval_ms = elapsed_ms(t);
                results
            }
        };

        if let Some(min_score) = self.config.min_score {
            results.retain(|hit| hit.score >= min_score);
        }
        tracing::debug!("Retrieved {} passages", results.len());

        enter(Stage::Assembling, progress, started, deadline)?;
        let t = Instant::now();
        let context = self.assembler.assemble(&results, self.corpus.as_ref(), budget);
        timings.assembly_ms = elapsed_ms(t);

        if context.is_empty() && self.config.short_circuit_on_empty {
            tracing::info!("No relevant context found, skipping generation");
            timings.total_ms = elapsed_ms(started);
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                context,
                timings,
            });
        }

        enter(Stage::Generating, progress, started, deadline)?;
        let t = Instant::now();
        let prompt = self
            .assembler
            .format_prompt(query, &context, &self.assembler.config().template);
        let text = self
            .with_retry(deadline, || self.generator.generate(&prompt, &self.sampling))
            .map_err(|e| PipelineError::new(Stage::Generating, e))?;
        timings.generation_ms = elapsed_ms(t);

        let citations = extract_citations(&text, &context);
        timings.total_ms = elapsed_ms(started);

        tracing::info!(
            "Answered with {} passages, {} citations in {}ms",
            context.passages.len(),
            citations.len(),
            timings.total_ms
        );

        Ok(Answer {
            text,
            citations,
            context,
            timings,
        })
    }

    /// Run a model call, retrying only `ModelUnavailable` with backoff
    fn with_retry<T>(&self, deadline: Option<Instant>, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(attempt, self.config.retry_backoff(), self.config.max_backoff());
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        return Err(e);
                    }
                    attempt += 1;
                    tracing::warn!(
                        "{} (retry {}/{} in {:?})",
                        e,
                        attempt,
                        self.config.max_retries,
                        delay
                    );
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

/// Move to `stage` unless the deadline has passed
fn enter(
    stage: Stage,
    progress: &Progress,
    started: Instant,
    deadline: Option<Instant>,
) -> std::result::Result<(), PipelineError> {
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(PipelineError::new(
            current_stage(progress),
            RagError::RequestTimeout {
                elapsed: started.elapsed(),
            },
        ));
    }
    tracing::debug!("Entering {} stage", stage);
    set_stage(progress, stage);
    Ok(())
}

/// Documents the answer cites
///
/// `[source: id]` tags naming a passage of the context, in order of first
/// appearance. Falls back to the context's documents in rank order when the
/// text cites none.
pub fn extract_citations(text: &str, context: &AssembledContext) -> Vec<String> {
    const TAG: &str = "[source:";

    let mut cited: Vec<String> = Vec::new();
    let mut cite = |id: &str| {
        if context.contains_document(id) && !cited.iter().any(|c| c == id) {
            cited.push(id.to_string());
        }
    };

    let mut rest = text;
    while let Some(pos) = rest.find(TAG) {
        rest = &rest[pos + TAG.len()..];
        let Some(close) = rest.find(']') else {
            break;
        };
        let inner = rest[..close].trim();
        if context.contains_document(inner) {
            cite(inner);
        } else {
            inner.split(',').map(str::trim).for_each(&mut cite);
        }
        rest = &rest[close + 1..];
    }

    if cited.is_empty() {
        context.document_ids()
    } else {
        cited
    }
}

/// Builder for constructing RAG pipelines
#[derive(Default)]
pub struct RagPipelineBuilder {
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<SharedIndex>>,
    corpus: Option<Arc<dyn CorpusStore>>,
    generator: Option<Arc<dyn Generator>>,
    templates: Option<PromptTemplates>,
    config: RagConfig,
    context: ContextConfig,
    sampling: SamplingParams,
}

impl RagPipelineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedder
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the index
    pub fn index(mut self, index: Arc<SharedIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the corpus passages are resolved against
    pub fn corpus(mut self, corpus: Arc<dyn CorpusStore>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Set the generator
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set custom prompt templates
    pub fn templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Set the pipeline configuration
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the context assembly configuration
    pub fn context_config(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Set the sampling parameters
    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<RagPipeline> {
        let missing = |what: &str| RagError::InvalidInput(format!("{} is required", what));
        let embedder = self.embedder.ok_or_else(|| missing("embedder"))?;
        let index = self.index.ok_or_else(|| missing("index"))?;
        let corpus = self.corpus.ok_or_else(|| missing("corpus"))?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;

        let retriever = Retriever::new(embedder, index)?.with_query_cache(self.config.query_cache_size);
        let mut assembler = ContextAssembler::new(self.context);
        if let Some(templates) = self.templates {
            assembler = assembler.with_templates(templates);
        }

        Ok(RagPipeline {
            inner: Arc::new(PipelineInner {
                retriever,
                corpus,
                generator,
                assembler,
                sampling: self.sampling,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Document, InMemoryCorpus, Span};
    use crate::embedding::{EmbeddingConfig, TokenEmbedder};
    use crate::rag::generator::ExtractiveGenerator;
    use crate::retrieval::{create_index, IndexConfig, IndexEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed text after failing `failures` times
    struct StubGenerator {
        reply: String,
        failure: fn() -> RagError,
        failures: usize,
        delay: Duration,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                failure: || RagError::unavailable("stub", "connection refused"),
                failures: 0,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, failures: usize, failure: fn() -> RagError) -> Self {
            self.failures = failures;
            self.failure = failure;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Generator for StubGenerator {
        fn generate(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            thread::sleep(self.delay);
            if call < self.failures {
                return Err((self.failure)());
            }
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(TokenEmbedder::new(EmbeddingConfig {
            max_length: 200,
            ..Default::default()
        }))
    }

    fn sky_and_grass(embedder: &Arc<dyn Embedder>) -> (Arc<SharedIndex>, Arc<InMemoryCorpus>) {
        let index = Arc::new(SharedIndex::new(create_index(&IndexConfig::default(), embedder.dimension())));
        let corpus = Arc::new(InMemoryCorpus::new());
        for (id, text) in [("doc1", "The sky is blue."), ("doc2", "Grass is green.")] {
            corpus.insert(Document::new(id, text)).unwrap();
            index
                .insert(IndexEntry::new(id, Span::whole(text), embedder.embed(text).unwrap()))
                .unwrap();
        }
        (index, corpus)
    }

    fn pipeline(generator: Arc<StubGenerator>, config: RagConfig) -> RagPipeline {
        let embedder = embedder();
        let (index, corpus) = sky_and_grass(&embedder);
        RagPipeline::builder()
            .embedder(embedder)
            .index(index)
            .corpus(corpus)
            .generator(generator)
            .config(config)
            .context_config(ContextConfig {
                max_passages: None,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    fn empty_pipeline(generator: Arc<StubGenerator>, config: RagConfig) -> RagPipeline {
        let embedder = embedder();
        let index = Arc::new(SharedIndex::new(create_index(&IndexConfig::default(), embedder.dimension())));
        RagPipeline::builder()
            .embedder(embedder)
            .index(index)
            .corpus(Arc::new(InMemoryCorpus::new()))
            .generator(generator)
            .config(config)
            .build()
            .unwrap()
    }

    fn fast_retries() -> RagConfig {
        RagConfig::default().with_retries(2, Duration::from_millis(1))
    }

    #[test]
    fn test_end_to_end_cites_matching_document() {
        let generator = Arc::new(StubGenerator::replying("The sky is blue."));
        let pipeline = pipeline(generator.clone(), RagConfig::default());

        let answer = pipeline.answer("What color is the sky?", 1, 1000).unwrap();

        assert_eq!(answer.citations, vec!["doc1".to_string()]);
        assert_eq!(answer.context.passages.len(), 1);
        assert_eq!(answer.context.passages[0].text, "The sky is blue.");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[source: doc1]\nThe sky is blue."));
        assert!(prompts[0].contains("What color is the sky?"));
    }

    #[test]
    fn test_extractive_answer_quotes_retrieved_passage() {
        let embedder = embedder();
        let (index, corpus) = sky_and_grass(&embedder);
        let pipeline = RagPipeline::builder()
            .embedder(embedder)
            .index(index)
            .corpus(corpus)
            .generator(Arc::new(ExtractiveGenerator::default()))
            .build()
            .unwrap();

        let answer = pipeline.answer("What color is the sky?", 1, 1000).unwrap();

        assert_eq!(
            answer.text,
            "Based on the uploaded documents:\n\nThe sky is blue. [source: doc1]"
        );
        assert_eq!(answer.citations, vec!["doc1".to_string()]);
    }

    #[test]
    fn test_citations_follow_tags_in_answer() {
        let generator = Arc::new(StubGenerator::replying(
            "Grass is green [source: doc2]. The sky is blue [source: doc1] [source: doc9].",
        ));
        let pipeline = pipeline(generator, RagConfig::default());

        let answer = pipeline.answer("What color is the sky?", 2, 1000).unwrap();
        assert_eq!(answer.citations, vec!["doc2".to_string(), "doc1".to_string()]);
    }

    #[test]
    fn test_empty_index_short_circuits() {
        let generator = Arc::new(StubGenerator::replying("unused"));
        let pipeline = empty_pipeline(generator.clone(), RagConfig::default());

        let answer = pipeline.answer("What color is the sky?", 5, 1000).unwrap();

        assert_eq!(answer.text, NO_CONTEXT_ANSWER);
        assert!(answer.citations.is_empty());
        assert!(answer.context.is_empty());
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_empty_index_generates_when_short_circuit_disabled() {
        let generator = Arc::new(StubGenerator::replying("I don't know."));
        let pipeline = empty_pipeline(generator.clone(), RagConfig::default().with_short_circuit(false));

        let answer = pipeline.answer("What color is the sky?", 5, 1000).unwrap();

        assert_eq!(answer.text, "I don't know.");
        assert!(answer.citations.is_empty());
        assert!(answer.context.is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn test_min_score_filters_everything() {
        let generator = Arc::new(StubGenerator::replying("unused"));
        let pipeline = pipeline(generator.clone(), RagConfig::default().with_min_score(1.5));

        let answer = pipeline.answer_default("What color is the sky?").unwrap();
        assert_eq!(answer.text, NO_CONTEXT_ANSWER);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_model_unavailable_is_retried() {
        let generator = Arc::new(
            StubGenerator::replying("The sky is blue.")
                .failing(2, || RagError::unavailable("stub", "connection refused")),
        );
        let pipeline = pipeline(generator.clone(), fast_retries());

        assert!(pipeline.answer("sky", 1, 1000).is_ok());
        assert_eq!(generator.calls(), 3);
    }

    #[test]
    fn test_retries_exhausted_names_generating_stage() {
        let generator = Arc::new(
            StubGenerator::replying("unused").failing(10, || RagError::unavailable("stub", "connection refused")),
        );
        let pipeline = pipeline(generator.clone(), fast_retries());

        let err = pipeline.answer("sky", 1, 1000).unwrap_err();
        assert_eq!(err.stage, Stage::Generating);
        assert!(matches!(err.source, RagError::ModelUnavailable { .. }));
        assert_eq!(generator.calls(), 3);
    }

    #[test]
    fn test_generation_timeout_not_retried() {
        let generator = Arc::new(StubGenerator::replying("unused").failing(1, || RagError::GenerationTimeout {
            timeout: Duration::from_secs(30),
        }));
        let pipeline = pipeline(generator.clone(), fast_retries());

        let err = pipeline.answer("sky", 1, 1000).unwrap_err();
        assert_eq!(err.stage, Stage::Generating);
        assert!(matches!(err.source, RagError::GenerationTimeout { .. }));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn test_long_query_fails_in_embedding_stage() {
        let generator = Arc::new(StubGenerator::replying("unused"));
        let pipeline = pipeline(generator.clone(), fast_retries());

        let err = pipeline.answer(&"sky ".repeat(100), 1, 1000).unwrap_err();
        assert_eq!(err.stage, Stage::Embedding);
        assert!(matches!(err.source, RagError::InputTooLong { .. }));
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_request_timeout_abandons_worker() {
        let generator = Arc::new(StubGenerator::replying("late").slow(Duration::from_millis(800)));
        let config = RagConfig::default().with_request_timeout(Some(Duration::from_millis(100)));
        let pipeline = pipeline(generator, config);

        let started = Instant::now();
        let err = pipeline.answer("sky", 1, 1000).unwrap_err();

        assert!(matches!(err.source, RagError::RequestTimeout { .. }));
        assert_eq!(err.stage, Stage::Generating);
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[test]
    fn test_empty_query_rejected() {
        let pipeline = pipeline(Arc::new(StubGenerator::replying("unused")), RagConfig::default());
        let err = pipeline.answer("   ", 1, 1000).unwrap_err();
        assert_eq!(err.stage, Stage::Idle);
    }

    #[test]
    fn test_concurrent_answers() {
        let generator = Arc::new(StubGenerator::replying("ok"));
        let pipeline = pipeline(generator.clone(), RagConfig::default().with_query_cache(16));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = pipeline.clone();
                thread::spawn(move || {
                    let query = if i % 2 == 0 { "sky" } else { "grass" };
                    pipeline.answer(query, 1, 1000).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().citations.len(), 1);
        }
        assert_eq!(generator.calls(), 8);
    }

    #[test]
    fn test_builder_requires_components() {
        assert!(RagPipeline::builder().build().is_err());
    }

    #[test]
    fn test_extract_citations_with_lists() {
        let context = AssembledContext {
            passages: ["a.txt", "b.txt"]
                .iter()
                .map(|id| crate::rag::context::Passage {
                    document_id: id.to_string(),
                    span: Span::new(0, 1),
                    text: "x".to_string(),
                    score: 1.0,
                    size: 1,
                })
                .collect(),
            used: 2,
            budget: 10,
            unit: Default::default(),
        };

        assert_eq!(extract_citations("see [source: b.txt, a.txt]", &context), vec!["b.txt", "a.txt"]);
        assert_eq!(extract_citations("no tags", &context), vec!["a.txt", "b.txt"]);
    }
}
