//! Local sentence-transformer embeddings using candle.

use super::{EmbeddingGateway, EmbeddingMatrix};
use crate::error::{RagEvalError, Result};
use anyhow::Context;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// BERT sentence-transformer loaded from the Hugging Face Hub, run on CPU.
///
/// Forward passes run on tokio's blocking pool.
pub struct LocalEmbeddingGateway {
    model_id: String,
    encoder: Arc<BertEncoder>,
}

struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalEmbeddingGateway {
    /// Load a sentence-transformers model by Hub identifier,
    /// e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub fn load(model_id: &str) -> Result<Self> {
        Self::try_load(model_id).map_err(|e| RagEvalError::Embedding(format!("{:#}", e)))
    }

    fn try_load(model_id: &str) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HF Hub API")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to get config.json")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to get tokenizer.json")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to get model weights")?;

        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .context("Failed to parse config")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .context("Failed to load model weights")?
        };

        let model = BertModel::load(vb, &config).context("Failed to load BERT model")?;
        info!(model = model_id, "loaded local embedding model");

        Ok(Self {
            model_id: model_id.to_string(),
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
            }),
        })
    }
}

impl BertEncoder {
    /// Mean-pooled, L2-normalised embeddings for one batch.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut attention_mask = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.resize(max_len, 0);
            mask.resize(max_len, 0);
            input_ids.extend(ids);
            attention_mask.extend(mask);
        }

        let shape = (texts.len(), max_len);
        let input_ids = Tensor::from_vec(input_ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(attention_mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Mean over real tokens only.
        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;
        let summed = (output * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = (summed / counts)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norms)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

#[async_trait]
impl EmbeddingGateway for LocalEmbeddingGateway {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        batch_size: usize,
    ) -> Result<EmbeddingMatrix> {
        if model != self.model_id {
            return Err(RagEvalError::Config(format!(
                "local gateway serves '{}', but '{}' was requested",
                self.model_id, model
            )));
        }
        if batch_size == 0 {
            return Err(RagEvalError::Config(
                "embedding batch size must be at least 1".to_string(),
            ));
        }

        let encoder = Arc::clone(&self.encoder);
        let rows = encode_on_blocking_pool(texts.to_vec(), batch_size, move |batch| {
            encoder.embed_batch(batch)
        })
        .await?;

        EmbeddingMatrix::from_rows(rows)
    }
}

/// Run `encode` over `texts` batch by batch on the blocking pool.
async fn encode_on_blocking_pool<F>(
    texts: Vec<String>,
    batch_size: usize,
    encode: F,
) -> Result<Vec<Vec<f32>>>
where
    F: Fn(&[String]) -> anyhow::Result<Vec<Vec<f32>>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut rows = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
            debug!(batch = batch_no, size = batch.len(), "embedding batch locally");
            let embedded = encode(batch).map_err(|e| RagEvalError::Embedding(format!("{:#}", e)))?;
            rows.extend(embedded);
        }
        Ok(rows)
    })
    .await
    .map_err(|e| RagEvalError::Embedding(format!("local embedding task failed: {}", e)))?
}
