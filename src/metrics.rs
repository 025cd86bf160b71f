//! Metrics over an evaluation results collection.
//!
//! Everything here is a pure function of the results, so recomputing from the
//! same results file gives identical output.

use crate::chunker::ChunkId;
use crate::error::{RagEvalError, Result};
use crate::evaluation::{EvaluationRecord, QueryId};
use crate::judge::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Fraction of the top `k` retrieved ids that are relevant.
///
/// The denominator is the requested `k`, so a ranking shorter than `k` is
/// penalised.
pub fn hit_rate(retrieved: &[ChunkId], relevant: &HashSet<ChunkId>, k: usize) -> Result<f64> {
    if k == 0 {
        return Err(RagEvalError::MetricsDomain(
            "hit rate is undefined for k = 0".to_string(),
        ));
    }

    let top: HashSet<ChunkId> = retrieved.iter().take(k).copied().collect();
    let hits = top.intersection(relevant).count();
    Ok(hits as f64 / k as f64)
}

/// Normalised discounted cumulative gain at `k`.
///
/// Fails when there is nothing to normalise by: an empty relevant set or an
/// effective cutoff `min(k, retrieved.len())` of zero.
pub fn ndcg(retrieved: &[ChunkId], relevant: &HashSet<ChunkId>, k: usize) -> Result<f64> {
    if relevant.is_empty() {
        return Err(RagEvalError::MetricsDomain(
            "NDCG is undefined for an empty relevant set".to_string(),
        ));
    }

    let cutoff = k.min(retrieved.len());
    if cutoff == 0 {
        return Err(RagEvalError::MetricsDomain(
            "NDCG is undefined for an effective cutoff of 0".to_string(),
        ));
    }

    let gain = |i: usize| 1.0 / ((i + 2) as f64).log2();

    let dcg: f64 = retrieved[..cutoff]
        .iter()
        .enumerate()
        .filter(|(_, id)| relevant.contains(*id))
        .map(|(i, _)| gain(i))
        .sum();
    let idcg: f64 = (0..relevant.len().min(cutoff)).map(gain).sum();

    Ok(dcg / idcg)
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Share of each verdict category in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub correct: f64,
    pub undecided: f64,
    pub incorrect: f64,
    pub wrong_evaluator: f64,
}

impl GenerationMetrics {
    /// Proportions of each category among `labels`. An empty batch is rejected.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = Option<&'a str>>) -> Result<Self> {
        let mut counts = [0usize; 4];
        let mut total = 0usize;

        for label in labels {
            let slot = match Verdict::from_label(label) {
                Verdict::Correct => 0,
                Verdict::Undecided => 1,
                Verdict::Incorrect => 2,
                Verdict::JudgeError => 3,
            };
            counts[slot] += 1;
            total += 1;
        }

        if total == 0 {
            return Err(RagEvalError::Config(
                "cannot compute generation metrics over an empty batch".to_string(),
            ));
        }

        let share = |count: usize| count as f64 / total as f64;
        Ok(Self {
            correct: share(counts[0]),
            undecided: share(counts[1]),
            incorrect: share(counts[2]),
            wrong_evaluator: share(counts[3]),
        })
    }
}

/// Contents of the generation metrics file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: GenerationMetrics,
    pub total: usize,
}

/// Retrieval quality of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryRetrievalMetrics {
    pub hit_rate: f64,
    pub ndcg: f64,
}

/// Contents of the retrieval metrics file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub per_query: BTreeMap<QueryId, QueryRetrievalMetrics>,
    pub avg_hit_rate: f64,
    pub std_hit_rate: f64,
    pub avg_ndcg: f64,
    pub std_ndcg: f64,
    pub k: usize,
}

/// Both reports for one results collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub generation: GenerationReport,
    pub retrieval: RetrievalReport,
}

pub fn generation_metrics(results: &BTreeMap<QueryId, EvaluationRecord>) -> Result<GenerationReport> {
    let generation =
        GenerationMetrics::from_labels(results.values().map(|record| record.label.as_deref()))?;
    Ok(GenerationReport {
        generation,
        total: results.len(),
    })
}

/// Per-query hit rate and NDCG at `k`, with batch mean and population std.
///
/// A query with no relevant documents makes NDCG undefined; the whole
/// computation fails and names the query.
pub fn retrieval_metrics(
    results: &BTreeMap<QueryId, EvaluationRecord>,
    k: usize,
) -> Result<RetrievalReport> {
    if results.is_empty() {
        return Err(RagEvalError::Config(
            "cannot compute retrieval metrics over an empty batch".to_string(),
        ));
    }

    let mut per_query = BTreeMap::new();
    for (id, record) in results {
        let relevant: HashSet<ChunkId> = record.relevant_docs.iter().copied().collect();
        let scores = hit_rate(&record.retrieved_docs, &relevant, k)
            .and_then(|hit_rate| {
                Ok(QueryRetrievalMetrics {
                    hit_rate,
                    ndcg: ndcg(&record.retrieved_docs, &relevant, k)?,
                })
            })
            .map_err(|e| match e {
                RagEvalError::MetricsDomain(msg) => {
                    RagEvalError::MetricsDomain(format!("query {}: {}", id, msg))
                }
                other => other,
            })?;
        per_query.insert(*id, scores);
    }

    let hit_rates: Vec<f64> = per_query.values().map(|m| m.hit_rate).collect();
    let ndcgs: Vec<f64> = per_query.values().map(|m| m.ndcg).collect();
    let (avg_hit_rate, std_hit_rate) = mean_std(&hit_rates);
    let (avg_ndcg, std_ndcg) = mean_std(&ndcgs);

    Ok(RetrievalReport {
        per_query,
        avg_hit_rate,
        std_hit_rate,
        avg_ndcg,
        std_ndcg,
        k,
    })
}

/// Generation and retrieval metrics for a results collection.
pub fn compute_all(results: &BTreeMap<QueryId, EvaluationRecord>, k: usize) -> Result<MetricsReport> {
    Ok(MetricsReport {
        generation: generation_metrics(results)?,
        retrieval: retrieval_metrics(results, k)?,
    })
}
