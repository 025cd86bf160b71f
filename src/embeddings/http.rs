//! OpenAI-compatible embeddings client.

use super::{EmbeddingGateway, EmbeddingMatrix};
use crate::config::EmbeddingConfig;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from the embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding gateway backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct HttpEmbeddingGateway {
    client: Client,
    api_base: String,
    api_key: String,
}

impl HttpEmbeddingGateway {
    /// Create a new gateway from configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Resolve the embeddings endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        if base.ends_with("/embeddings") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/embeddings", base)
        } else {
            format!("{}/v1/embeddings", base)
        }
    }

    /// Embed one request batch.
    async fn embed_batch(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model,
            input: inputs,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RagEvalError::Embedding(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RagEvalError::Embedding(format!("Invalid embeddings response: {}", e)))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(RagEvalError::DataIntegrity(format!(
                "embeddings endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingGateway for HttpEmbeddingGateway {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        batch_size: usize,
    ) -> Result<EmbeddingMatrix> {
        if batch_size == 0 {
            return Err(RagEvalError::Config(
                "embedding batch size must be at least 1".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
            debug!(batch = batch_no, size = batch.len(), model, "embedding batch");
            rows.extend(self.embed_batch(batch, model).await?);
        }

        EmbeddingMatrix::from_rows(rows)
    }
}
