//! Configuration for the RAG evaluator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::chunker::ChunkConfig;
use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration, shared by the answer generator and (by default) the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Judge overrides. Unset fields fall back to the `llm` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// YAML file holding the judge system message (`{role, content}`).
    pub prompt_path: Option<PathBuf>,
}

/// Which embedding gateway implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint.
    #[default]
    Http,
    /// Local sentence-transformer (requires the `local-embeddings` feature).
    Local,
}

/// Embedding gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub api_base: String,
    pub api_key: String,
    /// Model identifier passed to the gateway.
    pub model: String,
    /// Texts per gateway request.
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Http,
            api_base: String::new(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            batch_size: 32,
            timeout_secs: 60,
        }
    }
}

/// Chunking stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Directory whose files make up the corpus.
    pub documents_dir: PathBuf,
    /// Where the index artifact is written.
    pub index_file: PathBuf,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data/documents"),
            index_file: PathBuf::from("data/index.json"),
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

impl IndexingConfig {
    /// Chunking parameters for the indexer.
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Where the embedding matrix is written (comma-delimited, no header).
    pub embedding_file: PathBuf,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_file: PathBuf::from("data/embeddings.csv"),
            top_k: 5,
        }
    }
}

/// Evaluation and metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Query set: id -> {question, solution, relevant_documents}.
    pub qs_file: PathBuf,
    pub results_file: PathBuf,
    pub metrics_file: PathBuf,
    pub retrieval_metrics_file: PathBuf,
    /// Metrics cut-off. Defaults to `retrieval.top_k`.
    pub k: Option<usize>,
    /// Evaluate at most this many queries (lowest ids first).
    pub max_queries: Option<usize>,
    /// Evaluate only these query ids.
    pub query_ids: Option<Vec<u64>>,
    /// Maximum number of queries in flight against the oracles.
    pub concurrency: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            qs_file: PathBuf::from("data/questions.json"),
            results_file: PathBuf::from("output/results.json"),
            metrics_file: PathBuf::from("output/metrics.json"),
            retrieval_metrics_file: PathBuf::from("output/retrieval_metrics.json"),
            k: None,
            max_queries: None,
            query_ids: None,
            concurrency: 4,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub judge: JudgeConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Load configuration from an optional explicit path plus environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, EMBEDDING_API_KEY, ...)
    /// 2. The explicit config file, or ~/.config/rag-evaluator/config.yaml
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| RagEvalError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.llm.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                self.llm.temperature = temp;
            }
        }

        if let Ok(api_base) = env::var("EMBEDDING_API_BASE") {
            self.embedding.api_base = api_base;
        }

        if let Ok(api_key) = env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = api_key;
        }

        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-evaluator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Metrics cut-off: `evaluation.k`, or the retrieval top-k when unset.
    pub fn metrics_k(&self) -> usize {
        self.evaluation.k.unwrap_or(self.retrieval.top_k)
    }

    /// Model used by the judge.
    pub fn judge_model(&self) -> &str {
        self.judge.model.as_deref().unwrap_or(&self.llm.model)
    }

    /// Temperature used by the judge.
    pub fn judge_temperature(&self) -> f32 {
        self.judge.temperature.unwrap_or(self.llm.temperature)
    }

    /// Validate the parts of the configuration needed for chunking, retrieval and metrics.
    ///
    /// None of these checks need a collaborator, so a bad run fails before any oracle call.
    pub fn validate_pipeline(&self) -> Result<()> {
        self.indexing.chunk_config().validate()?;

        if self.retrieval.top_k == 0 {
            return Err(RagEvalError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }

        if self.evaluation.k == Some(0) {
            return Err(RagEvalError::Config(
                "evaluation.k must be at least 1".to_string(),
            ));
        }

        if self.evaluation.max_queries == Some(0) {
            return Err(RagEvalError::Config(
                "evaluation.max_queries must be at least 1 when set".to_string(),
            ));
        }

        if self.evaluation.concurrency == 0 {
            return Err(RagEvalError::Config(
                "evaluation.concurrency must be at least 1".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(RagEvalError::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that the embedding gateway settings are present.
    pub fn validate_embedding(&self) -> Result<()> {
        if self.embedding.model.is_empty() {
            return Err(RagEvalError::Config(
                "Embedding model is required. Set EMBEDDING_MODEL environment variable or add to config file.".to_string(),
            ));
        }

        if self.embedding.backend == EmbeddingBackend::Http && self.embedding.api_base.is_empty() {
            return Err(RagEvalError::Config(
                "Embedding API base URL is required. Set EMBEDDING_API_BASE environment variable or add to config file.".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that required LLM configuration is present.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagEvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagEvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagEvalError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate everything a full run needs.
    pub fn validate(&self) -> Result<()> {
        self.validate_pipeline()?;
        self.validate_embedding()?;
        self.validate_llm()
    }
}
