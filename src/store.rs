//! In-memory vector store with exact cosine-similarity search.
//!
//! Stored rows are L2-normalised once at load time; queries are normalised per
//! search. Every query is scored against every stored row, so search cost is
//! O(queries x corpus x dimension). Ranking is by descending similarity, ties
//! broken by lower chunk identifier first.

use crate::chunker::{ChunkId, Index};
use crate::embeddings::EmbeddingMatrix;
use crate::error::{RagEvalError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A chunk identifier with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub score: f32,
}

/// Top-k result for one query, best first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ranking {
    pub hits: Vec<ScoredChunk>,
}

impl Ranking {
    /// Identifiers in rank order.
    pub fn ids(&self) -> Vec<ChunkId> {
        self.hits.iter().map(|h| h.id).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Return a unit-length copy of `v`.
///
/// Zero-norm and non-finite vectors are rejected.
pub fn l2_normalize(v: &[f32]) -> Result<Vec<f32>> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(RagEvalError::DataIntegrity(
            "embedding contains non-finite values".to_string(),
        ));
    }

    // Accumulate in f64 so large components do not overflow and tiny ones
    // do not vanish.
    let norm = v
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return Err(RagEvalError::DataIntegrity("empty embedding".to_string()));
    }

    Ok(v.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

/// Searchable corpus of chunk embeddings. Row `i` belongs to chunk `i`.
#[derive(Debug, Clone)]
pub struct VectorStore {
    normalized: EmbeddingMatrix,
}

impl VectorStore {
    /// Load an embedding matrix as the searchable corpus.
    pub fn load(matrix: EmbeddingMatrix) -> Result<Self> {
        if matrix.is_empty() {
            return Err(RagEvalError::DataIntegrity(
                "cannot load an empty embedding matrix".to_string(),
            ));
        }

        let rows = matrix
            .iter_rows()
            .enumerate()
            .map(|(id, row)| {
                l2_normalize(row).map_err(|e| {
                    RagEvalError::DataIntegrity(format!("stored vector {}: {}", id, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let normalized = EmbeddingMatrix::from_rows(rows)?;
        debug!(rows = normalized.rows(), dim = normalized.dim(), "loaded vector store");
        Ok(Self { normalized })
    }

    /// Load a matrix that must line up row-for-row with `index`.
    pub fn load_for_index(matrix: EmbeddingMatrix, index: &Index) -> Result<Self> {
        if matrix.rows() != index.len() {
            return Err(RagEvalError::DataIntegrity(format!(
                "embedding matrix has {} rows but the index has {} chunks",
                matrix.rows(),
                index.len()
            )));
        }
        Self::load(matrix)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.normalized.rows()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.normalized.dim()
    }

    /// Reject a top-k that the corpus cannot satisfy.
    pub fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(RagEvalError::Config("top-k must be at least 1".to_string()));
        }
        if k > self.len() {
            return Err(RagEvalError::Config(format!(
                "top-k ({}) exceeds corpus size ({})",
                k,
                self.len()
            )));
        }
        Ok(())
    }

    /// Rank the corpus for every query vector and keep the top `k` of each.
    pub fn search(&self, queries: &EmbeddingMatrix, k: usize) -> Result<Vec<Ranking>> {
        self.check_k(k)?;

        if !queries.is_empty() && queries.dim() != self.dim() {
            return Err(RagEvalError::DataIntegrity(format!(
                "query dimension {} does not match corpus dimension {}",
                queries.dim(),
                self.dim()
            )));
        }

        queries
            .iter_rows()
            .map(|query| self.rank(query, k))
            .collect()
    }

    /// Rank the corpus for a single query vector.
    pub fn search_one(&self, query: &[f32], k: usize) -> Result<Ranking> {
        let queries = EmbeddingMatrix::from_rows(vec![query.to_vec()])?;
        let mut rankings = self.search(&queries, k)?;
        Ok(rankings.remove(0))
    }

    /// Cosine similarity of `query` against every stored row, in identifier order.
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dim() {
            return Err(RagEvalError::DataIntegrity(format!(
                "query dimension {} does not match corpus dimension {}",
                query.len(),
                self.dim()
            )));
        }

        let query = l2_normalize(query)?;
        Ok(self
            .normalized
            .iter_rows()
            // `+ 0.0` folds -0.0 into 0.0 so equal scores tie under total_cmp.
            .map(|row| row.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>() + 0.0)
            .collect())
    }

    fn rank(&self, query: &[f32], k: usize) -> Result<Ranking> {
        let scores = self.similarities(query)?;

        let mut order: Vec<ChunkId> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        order.truncate(k);

        Ok(Ranking {
            hits: order
                .into_iter()
                .map(|id| ScoredChunk {
                    id,
                    score: scores[id],
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f32>>) -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(rows).unwrap()
    }

    fn orthogonal_store() -> VectorStore {
        VectorStore::load(matrix(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]))
        .unwrap()
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_empty_embedding() {
        let err = l2_normalize(&[0.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("empty embedding"));

        assert!(matches!(
            VectorStore::load(matrix(vec![vec![1.0, 0.0], vec![0.0, 0.0]])),
            Err(RagEvalError::DataIntegrity(_))
        ));

        let store = orthogonal_store();
        assert!(matches!(
            store.search_one(&[0.0, 0.0, 0.0], 1),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_orthogonal_top1() {
        let store = orthogonal_store();
        let ranking = store.search_one(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(ranking.ids(), vec![0]);
        assert!((ranking.hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_top3_with_tie_break() {
        let store = orthogonal_store();
        let ranking = store.search_one(&[1.0, 0.0, 0.0], 3).unwrap();
        // e2 and e3 both score 0.0; lower identifier wins.
        assert_eq!(ranking.ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_ties_prefer_lower_identifier() {
        let store = VectorStore::load(matrix(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![0.5, 0.0],
        ]))
        .unwrap();
        let ranking = store.search_one(&[1.0, 0.0], 4).unwrap();
        assert_eq!(ranking.ids(), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_signed_zero_scores_tie_by_identifier() {
        let store = VectorStore::load(matrix(vec![
            vec![-1.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, -1.0],
        ]))
        .unwrap();
        let ranking = store.search_one(&[0.0, -1.0], 3).unwrap();
        assert_eq!(ranking.ids(), vec![2, 0, 1]);
        assert!(ranking.hits[1].score.is_sign_positive());
    }

    #[test]
    fn test_normalize_extreme_magnitudes() {
        let big = l2_normalize(&[3.0e20, 4.0e20]).unwrap();
        assert!((big[0] - 0.6).abs() < 1e-6);
        assert!((big[1] - 0.8).abs() < 1e-6);

        let tiny = l2_normalize(&[3.0e-25, 4.0e-25]).unwrap();
        assert!((tiny[0] - 0.6).abs() < 1e-6);
        assert!((tiny[1] - 0.8).abs() < 1e-6);

        let store = VectorStore::load(matrix(vec![vec![1.0e20, 0.0], vec![0.0, 1.0e20]])).unwrap();
        assert_eq!(store.search_one(&[0.0, 1.0], 1).unwrap().ids(), vec![1]);
    }

    #[test]
    fn test_scores_descending() {
        let store = VectorStore::load(matrix(vec![
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.2],
        ]))
        .unwrap();
        let ranking = store.search_one(&[0.2, 1.0], 4).unwrap();
        assert_eq!(ranking.ids(), vec![2, 1, 0, 3]);
        for pair in ranking.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_batch_search_matches_single() {
        let store = VectorStore::load(matrix(vec![
            vec![0.3, 0.1, 0.9],
            vec![0.7, 0.7, 0.0],
            vec![0.1, 0.9, 0.2],
        ]))
        .unwrap();
        let queries = matrix(vec![vec![1.0, 0.5, 0.0], vec![0.0, 0.1, 1.0]]);

        let batch = store.search(&queries, 2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], store.search_one(queries.row(0), 2).unwrap());
        assert_eq!(batch[1], store.search_one(queries.row(1), 2).unwrap());
    }

    #[test]
    fn test_search_is_deterministic() {
        let store = VectorStore::load(matrix(vec![
            vec![0.25, 0.5, 0.1],
            vec![0.5, 0.25, 0.1],
            vec![0.25, 0.5, 0.1],
        ]))
        .unwrap();
        let first = store.search_one(&[0.3, 0.3, 0.3], 3).unwrap();
        let second = store.search_one(&[0.3, 0.3, 0.3], 3).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_k_out_of_range_is_config_error() {
        let store = orthogonal_store();
        assert!(matches!(
            store.search_one(&[1.0, 0.0, 0.0], 4),
            Err(RagEvalError::Config(_))
        ));
        assert!(matches!(
            store.search_one(&[1.0, 0.0, 0.0], 0),
            Err(RagEvalError::Config(_))
        ));
        let queries = matrix(vec![vec![1.0, 0.0, 0.0]]);
        assert!(matches!(
            store.search(&queries, 4),
            Err(RagEvalError::Config(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_integrity_error() {
        let store = orthogonal_store();
        assert!(matches!(
            store.search_one(&[1.0, 0.0], 1),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_load_for_index_checks_row_count() {
        use crate::chunker::{ChunkConfig, IndexBuilder};

        let mut builder = IndexBuilder::new(ChunkConfig {
            chunk_size: 2,
            chunk_overlap: 0,
        })
        .unwrap();
        builder.add_document("a.txt", "abcd");
        let index = builder.build();

        assert!(VectorStore::load_for_index(orthogonal_matrix(), &index).is_err());
        let two = matrix(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(VectorStore::load_for_index(two, &index).unwrap().len(), 2);
    }

    fn orthogonal_matrix() -> EmbeddingMatrix {
        matrix(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
    }
}
