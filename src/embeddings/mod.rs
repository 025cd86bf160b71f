//! Embedding gateway capability and the dense embedding matrix.
//!
//! The gateway is an external collaborator: given texts, a model identifier and
//! a batch size it returns one fixed-dimension vector per text. Two
//! implementations ship with the crate:
//! - [`HttpEmbeddingGateway`] for OpenAI-compatible `/embeddings` endpoints
//! - `LocalEmbeddingGateway` (feature `local-embeddings`) running a BERT
//!   sentence-transformer on CPU with candle

mod http;
#[cfg(feature = "local-embeddings")]
mod local;

pub use http::HttpEmbeddingGateway;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddingGateway;

use crate::chunker::Index;
use crate::error::{RagEvalError, Result};
use async_trait::async_trait;
use tracing::info;

/// Maps texts to vectors. Must be deterministic for a fixed model and input.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embed `texts`, sending at most `batch_size` texts per underlying request.
    ///
    /// Returns one row per input, in input order.
    async fn embed(&self, texts: &[String], model: &str, batch_size: usize)
    -> Result<EmbeddingMatrix>;
}

/// Dense row-major matrix of `f32` embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Build from rows. All rows must have the same, non-zero length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);

        if !rows.is_empty() && dim == 0 {
            return Err(RagEvalError::DataIntegrity(
                "embedding rows have zero dimension".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(RagEvalError::DataIntegrity(format!(
                    "embedding row {} has dimension {}, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend(row);
        }

        Ok(Self { dim, data })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Number of columns.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Check if the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row `i`. Panics if out of range.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }
}

/// Embed every chunk of the index, in identifier order, in one pass.
pub async fn embed_index(
    gateway: &dyn EmbeddingGateway,
    index: &Index,
    model: &str,
    batch_size: usize,
) -> Result<EmbeddingMatrix> {
    if batch_size == 0 {
        return Err(RagEvalError::Config(
            "embedding batch size must be at least 1".to_string(),
        ));
    }
    if index.is_empty() {
        return Err(RagEvalError::DataIntegrity(
            "cannot embed an empty index".to_string(),
        ));
    }

    let texts = index.texts();
    let matrix = gateway.embed(&texts, model, batch_size).await?;

    if matrix.rows() != index.len() {
        return Err(RagEvalError::DataIntegrity(format!(
            "embedding gateway returned {} rows for {} chunks",
            matrix.rows(),
            index.len()
        )));
    }

    info!(rows = matrix.rows(), dim = matrix.dim(), model, "embedded index");
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkConfig, IndexBuilder};

    /// Deterministic gateway: a vector of character-class counts.
    struct CountingGateway;

    #[async_trait]
    impl EmbeddingGateway for CountingGateway {
        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
            _batch_size: usize,
        ) -> Result<EmbeddingMatrix> {
            EmbeddingMatrix::from_rows(
                texts
                    .iter()
                    .map(|t| {
                        vec![
                            t.chars().filter(|c| c.is_alphabetic()).count() as f32,
                            t.chars().filter(|c| c.is_numeric()).count() as f32,
                            1.0,
                        ]
                    })
                    .collect(),
            )
        }
    }

    /// Gateway that drops the last row.
    struct ShortGateway;

    #[async_trait]
    impl EmbeddingGateway for ShortGateway {
        async fn embed(&self, texts: &[String], _: &str, _: usize) -> Result<EmbeddingMatrix> {
            EmbeddingMatrix::from_rows(vec![vec![1.0]; texts.len().saturating_sub(1)])
        }
    }

    fn small_index() -> Index {
        let mut builder = IndexBuilder::new(ChunkConfig {
            chunk_size: 4,
            chunk_overlap: 0,
        })
        .unwrap();
        builder.add_document("a.txt", "ab12cd34");
        builder.build()
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let result = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![1.0]]);
        assert!(matches!(result, Err(RagEvalError::DataIntegrity(_))));
    }

    #[test]
    fn test_matrix_accessors() {
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.dim(), 2);
        assert_eq!(matrix.row(1), &[3.0, 4.0]);
        assert_eq!(matrix.iter_rows().count(), 2);

        let empty = EmbeddingMatrix::from_rows(Vec::new()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.rows(), 0);
        assert_eq!(empty.iter_rows().count(), 0);
    }

    #[tokio::test]
    async fn test_embed_index_one_row_per_chunk() {
        let index = small_index();
        let matrix = embed_index(&CountingGateway, &index, "counting", 8)
            .await
            .unwrap();
        assert_eq!(matrix.rows(), index.len());
        assert_eq!(matrix.row(0), &[2.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_embed_index_row_mismatch_is_integrity_error() {
        let index = small_index();
        let result = embed_index(&ShortGateway, &index, "short", 8).await;
        assert!(matches!(result, Err(RagEvalError::DataIntegrity(_))));
    }

    #[tokio::test]
    async fn test_embed_index_zero_batch_size() {
        let index = small_index();
        let result = embed_index(&CountingGateway, &index, "counting", 0).await;
        assert!(matches!(result, Err(RagEvalError::Config(_))));
    }
}
