//! RAG Evaluator - end-to-end evaluation of a retrieval-augmented generation pipeline.
//!
//! The pipeline runs in four stages, each reading the artifacts of the
//! previous one:
//! 1. **Index**: split a corpus directory into fixed-size overlapping
//!    character windows with dense chunk identifiers
//! 2. **Embed**: turn every chunk into a vector through an embedding gateway
//! 3. **Evaluate**: retrieve the top-k chunks for each question with exact
//!    cosine search, generate an answer from them and grade it with an
//!    LLM judge
//! 4. **Metrics**: verdict proportions plus hit-rate@k and NDCG@k
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_evaluator::{
//!     config::Config,
//!     embeddings::HttpEmbeddingGateway,
//!     llm::LlmClient,
//!     pipeline::{Collaborators, run_all},
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let client = Arc::new(LlmClient::new(config.llm.clone())?);
//!     let collaborators = Collaborators {
//!         embeddings: Arc::new(HttpEmbeddingGateway::new(&config.embedding)?),
//!         generation: client.clone(),
//!         judge: client,
//!     };
//!
//!     let summary = run_all(&config, &collaborators, &CancellationToken::new()).await?;
//!     if let Some(metrics) = summary.metrics {
//!         println!("correct: {:.2}", metrics.generation.generation.correct);
//!         println!("hit rate: {:.2}", metrics.retrieval.avg_hit_rate);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Chunker**: builds an immutable [`Index`] from documents
//! - **EmbeddingGateway**: external text → vector capability
//! - **VectorStore / Retriever**: exact brute-force cosine top-k
//! - **AnswerGenerator**: prompts the generation oracle with retrieved context
//! - **Judge**: grades answers against reference solutions
//! - **Evaluator**: bounded-concurrency generate → judge over a query batch
//! - **metrics**: pure aggregation over the results artifact

pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod generator;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod retriever;
pub mod store;

// Re-export commonly used types
pub use chunker::{Chunk, ChunkConfig, ChunkId, Index, IndexBuilder, build_index};
pub use config::Config;
pub use document::{Document, load_corpus};
pub use embeddings::{EmbeddingGateway, EmbeddingMatrix};
pub use error::{RagEvalError, Result};
pub use evaluation::{EvaluationRecord, Evaluator, QueryId, QuerySet, ResultsCollection};
pub use generator::AnswerGenerator;
pub use judge::{Judge, Verdict};
pub use llm::{CompletionOracle, LlmClient};
pub use metrics::{MetricsReport, hit_rate, ndcg};
pub use persistence::{load_index, save_index};
pub use retriever::Retriever;
pub use store::{Ranking, VectorStore};
