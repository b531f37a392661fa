//! Layered settings
//!
//! Defaults, then an optional TOML file, then `DOCQA_*` environment
//! variables. The CLI applies its flags last.

use crate::data::ChunkConfig;
use crate::embedding::EmbeddingConfig;
use crate::rag::{ContextConfig, GeneratorConfig, RagConfig};
use crate::retrieval::IndexConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

/// Where persistent state lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Index directory; defaults to `~/.cache/docqa/index`
    pub index_dir: Option<PathBuf>,
    /// Keep computed embeddings in `<index_dir>/embeddings.db`
    pub embedding_cache: bool,
}

/// All settings, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingConfig,
    pub generation: GeneratorConfig,
    pub retrieval: IndexConfig,
    pub chunking: ChunkConfig,
    pub context: ContextConfig,
    pub pipeline: RagConfig,
    pub storage: StorageConfig,
}

impl Settings {
    /// Load settings from `path`, or from `docqa.toml` if it exists, then
    /// apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML file; missing sections and fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).context(format!("Failed to read config file {:?}", path))?;
        let settings: Self = toml::from_str(&text).context(format!("Invalid config file {:?}", path))?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Apply `DOCQA_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DOCQA_EMBEDDING_BACKEND") {
            self.embedding.backend = v;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_MODEL") {
            self.embedding.model_name = v;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse("DOCQA_EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("DOCQA_GENERATION_BACKEND") {
            self.generation.backend = v;
        }
        if let Some(v) = lookup("DOCQA_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("DOCQA_OLLAMA_URL") {
            self.embedding.base_url = v.clone();
            self.generation.base_url = v;
        }
        if let Some(v) = lookup("DOCQA_INDEX_BACKEND") {
            self.retrieval.backend = v;
        }
        if let Some(v) = lookup("DOCQA_METRIC") {
            self.retrieval.metric = parse("DOCQA_METRIC", &v)?;
        }
        if let Some(v) = lookup("DOCQA_TOP_K") {
            self.pipeline.default_k = parse("DOCQA_TOP_K", &v)?;
        }
        if let Some(v) = lookup("DOCQA_BUDGET") {
            self.pipeline.default_budget = parse("DOCQA_BUDGET", &v)?;
        }
        if let Some(v) = lookup("DOCQA_MAX_RETRIES") {
            self.pipeline.max_retries = parse("DOCQA_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("DOCQA_REQUEST_TIMEOUT_MS") {
            self.pipeline.request_timeout_ms = parse("DOCQA_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("DOCQA_INDEX_DIR") {
            self.storage.index_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Reject combinations that would fail later in less obvious ways
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be positive");
        }
        if self.pipeline.default_k == 0 {
            bail!("pipeline.default_k must be positive");
        }
        if self.chunking.chunk_size > self.embedding.max_length {
            bail!(
                "chunking.chunk_size ({}) exceeds embedding.max_length ({}); chunks would be rejected",
                self.chunking.chunk_size,
                self.embedding.max_length
            );
        }
        Ok(())
    }

    /// Index directory, falling back to the per-user data directory
    pub fn index_dir(&self) -> Result<PathBuf> {
        match &self.storage.index_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(crate::utils::get_data_dir()?.join("index")),
        }
    }

    /// Embedding settings with the cache path resolved
    pub fn embedding_config(&self) -> Result<EmbeddingConfig> {
        let mut config = self.embedding.clone();
        if self.storage.embedding_cache && config.cache_path.is_none() {
            config.cache_path = Some(self.index_dir()?.join("embeddings.db"));
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Metric;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.embedding.model_name, "all-MiniLM-L6-v2");
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.generation.model, "llama3.2");
        assert_eq!(settings.retrieval.metric, Metric::Cosine);
        assert_eq!(settings.pipeline.default_k, 5);
        assert_eq!(settings.chunking.chunk_size, 400);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        std::fs::write(
            &path,
            "[retrieval]\nbackend = \"hnsw\"\nmetric = \"euclidean\"\n\n[pipeline]\ndefault_k = 3\n",
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.retrieval.backend, "hnsw");
        assert_eq!(settings.retrieval.metric, Metric::Euclidean);
        assert_eq!(settings.retrieval.ef_search, 64);
        assert_eq!(settings.pipeline.default_k, 3);
        assert_eq!(settings.pipeline.default_budget, 1500);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCQA_EMBEDDING_BACKEND", "mock"),
            ("DOCQA_METRIC", "l2"),
            ("DOCQA_TOP_K", "7"),
            ("DOCQA_OLLAMA_URL", "http://gpu-box:11434"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.embedding.backend, "mock");
        assert_eq!(settings.retrieval.metric, Metric::Euclidean);
        assert_eq!(settings.pipeline.default_k, 7);
        assert_eq!(settings.generation.base_url, "http://gpu-box:11434");
        assert_eq!(settings.embedding.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|key| (key == "DOCQA_TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DOCQA_TOP_K"));
    }

    #[test]
    fn test_chunks_must_fit_embedder() {
        let mut settings = Settings::default();
        settings.chunking.chunk_size = settings.embedding.max_length + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_embedding_cache_path() {
        let settings = Settings {
            storage: StorageConfig {
                index_dir: Some(PathBuf::from("/tmp/docqa-test")),
                embedding_cache: true,
            },
            ..Default::default()
        };
        let config = settings.embedding_config().unwrap();
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/docqa-test/embeddings.db")));
    }
}
