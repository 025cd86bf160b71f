//! Query-text retrieval: embed the query through the gateway, rank the store.

use crate::embeddings::EmbeddingGateway;
use crate::error::{RagEvalError, Result};
use crate::store::{Ranking, VectorStore};
use std::sync::Arc;
use tracing::debug;

/// Retrieves the top-k chunks for free-text queries.
pub struct Retriever {
    store: Arc<VectorStore>,
    gateway: Arc<dyn EmbeddingGateway>,
    model: String,
    batch_size: usize,
    top_k: usize,
}

impl Retriever {
    /// Create a retriever. `top_k` must lie in `1..=store.len()`.
    pub fn new(
        store: Arc<VectorStore>,
        gateway: Arc<dyn EmbeddingGateway>,
        model: impl Into<String>,
        batch_size: usize,
        top_k: usize,
    ) -> Result<Self> {
        store.check_k(top_k)?;
        if batch_size == 0 {
            return Err(RagEvalError::Config(
                "embedding batch size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            gateway,
            model: model.into(),
            batch_size,
            top_k,
        })
    }

    /// Number of chunks returned per query.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The underlying store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Rank the corpus for every query, embedding all queries in one gateway call.
    pub async fn retrieve(&self, queries: &[String]) -> Result<Vec<Ranking>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let embedded = self
            .gateway
            .embed(queries, &self.model, self.batch_size)
            .await?;

        if embedded.rows() != queries.len() {
            return Err(RagEvalError::DataIntegrity(format!(
                "embedding gateway returned {} rows for {} queries",
                embedded.rows(),
                queries.len()
            )));
        }

        let rankings = self.store.search(&embedded, self.top_k)?;
        debug!(queries = queries.len(), top_k = self.top_k, "retrieved");
        Ok(rankings)
    }

    /// Rank the corpus for a single query.
    pub async fn retrieve_one(&self, query: &str) -> Result<Ranking> {
        let mut rankings = self.retrieve(&[query.to_string()]).await?;
        Ok(rankings.remove(0))
    }
}
