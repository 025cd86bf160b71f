//! Evaluation orchestration: query sets, per-query generate/judge pipelines
//! and the shared results collection.
//!
//! Each query moves through `pending → generated → judged` or, when the
//! generation oracle produced nothing, `pending → generated → labeled-failed`
//! with the fixed failure label and no judge call.

use crate::chunker::ChunkId;
use crate::error::{RagEvalError, Result};
use crate::generator::AnswerGenerator;
use crate::judge::{GENERATION_FAILED_LABEL, Judge, Verdict};
use crate::store::Ranking;
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Query identifier, unique within a query set.
pub type QueryId = u64;

/// One evaluation question with its reference solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryItem {
    pub question: String,
    pub solution: String,
    /// Chunk identifiers judged relevant to the question.
    #[serde(default)]
    pub relevant_documents: Vec<ChunkId>,
}

/// Which queries of a set to evaluate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySelection {
    /// Explicit ids. `None` means every query.
    pub ids: Option<Vec<QueryId>>,
    /// Cap applied after `ids`, over ids in ascending order.
    pub limit: Option<usize>,
}

/// Query set keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySet {
    items: BTreeMap<QueryId, QueryItem>,
}

impl QuerySet {
    pub fn new(items: BTreeMap<QueryId, QueryItem>) -> Self {
        Self { items }
    }

    /// Load a query file: a JSON object keyed by decimal query id.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagEvalError::ArtifactNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
        let set: QuerySet = serde_json::from_str(&content)?;
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: QueryId) -> Option<&QueryItem> {
        self.items.get(&id)
    }

    /// Resolve a selection to an ordered batch.
    ///
    /// Unknown ids and an empty result are configuration errors.
    pub fn select(&self, selection: &QuerySelection) -> Result<Vec<(QueryId, QueryItem)>> {
        let mut batch: Vec<(QueryId, QueryItem)> = match &selection.ids {
            Some(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids.dedup();
                ids.into_iter()
                    .map(|id| {
                        self.items
                            .get(&id)
                            .map(|item| (id, item.clone()))
                            .ok_or_else(|| {
                                RagEvalError::Config(format!("query {} is not in the query set", id))
                            })
                    })
                    .collect::<Result<_>>()?
            }
            None => self
                .items
                .iter()
                .map(|(id, item)| (*id, item.clone()))
                .collect(),
        };

        if let Some(limit) = selection.limit {
            batch.truncate(limit);
        }

        if batch.is_empty() {
            return Err(RagEvalError::Config(
                "query selection is empty; nothing to evaluate".to_string(),
            ));
        }
        Ok(batch)
    }
}

/// Outcome of one query, written once to the results collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub solution: String,
    /// `None` when generation failed.
    pub answer: Option<String>,
    /// Chunk ids placed in the prompt, in rank order.
    pub retrieved_docs: Vec<ChunkId>,
    pub relevant_docs: Vec<ChunkId>,
    /// Raw judge label, the failure sentinel, or `None` if the judge call failed.
    pub label: Option<String>,
}

impl EvaluationRecord {
    pub fn verdict(&self) -> Verdict {
        Verdict::from_label(self.label.as_deref())
    }

    /// Terminal state reached by this record.
    pub fn state(&self) -> QueryState {
        if self.answer.is_some() {
            QueryState::Judged
        } else {
            QueryState::LabeledFailed
        }
    }
}

/// Per-query lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    Generated,
    Judged,
    LabeledFailed,
}

/// Append-only results keyed by query id, safe for concurrent insertion.
#[derive(Debug, Clone, Default)]
pub struct ResultsCollection {
    records: Arc<Mutex<BTreeMap<QueryId, EvaluationRecord>>>,
}

impl ResultsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. A second write for the same id is rejected.
    pub async fn insert(&self, id: QueryId, record: EvaluationRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&id) {
            return Err(RagEvalError::DuplicateQuery(id));
        }
        records.insert(id, record);
        Ok(())
    }

    /// Copy of the records collected so far, ordered by id.
    pub async fn snapshot(&self) -> BTreeMap<QueryId, EvaluationRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub requested: usize,
    pub completed: usize,
    pub cancelled: bool,
}

/// Runs generate → judge for a batch of queries with bounded concurrency.
pub struct Evaluator {
    generator: Arc<AnswerGenerator>,
    judge: Arc<Judge>,
    concurrency: usize,
}

impl Evaluator {
    pub fn new(
        generator: Arc<AnswerGenerator>,
        judge: Arc<Judge>,
        concurrency: usize,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(RagEvalError::Config(
                "evaluation concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            generator,
            judge,
            concurrency,
        })
    }

    /// Generate and judge one query against an already retrieved ranking.
    ///
    /// Oracle failures end up in the record's label; only data errors surface.
    pub async fn evaluate_query(
        &self,
        id: QueryId,
        item: &QueryItem,
        retrieved: Ranking,
    ) -> Result<EvaluationRecord> {
        debug!(query = id, state = ?QueryState::Pending, "query started");
        let answer = self.generator.answer(&item.question, &retrieved).await?;
        debug!(
            query = id,
            state = ?QueryState::Generated,
            answered = answer.is_some(),
            "generation done"
        );

        let label = match &answer {
            Some(answer) => self.judge.judge(&item.solution, answer).await,
            None => Some(GENERATION_FAILED_LABEL.to_string()),
        };

        let record = EvaluationRecord {
            question: item.question.clone(),
            solution: item.solution.clone(),
            answer,
            retrieved_docs: retrieved.ids(),
            relevant_docs: item.relevant_documents.clone(),
            label,
        };
        debug!(
            query = id,
            state = ?record.state(),
            verdict = ?record.verdict(),
            "query scored"
        );
        Ok(record)
    }

    /// Evaluate a batch, inserting each finished record into `results`.
    ///
    /// Retrieval for the whole batch runs before any oracle call. Cancelling
    /// `cancel` stops the run; records already inserted stay in `results`.
    pub async fn run(
        &self,
        batch: Vec<(QueryId, QueryItem)>,
        results: &ResultsCollection,
        cancel: &CancellationToken,
    ) -> Result<EvaluationSummary> {
        if batch.is_empty() {
            return Err(RagEvalError::Config("evaluation batch is empty".to_string()));
        }

        let requested = batch.len();
        let mut summary = EvaluationSummary {
            requested,
            completed: 0,
            cancelled: false,
        };

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let questions: Vec<String> = batch.iter().map(|(_, item)| item.question.clone()).collect();
        let rankings = self.generator.retriever().retrieve(&questions).await?;
        info!(
            queries = requested,
            top_k = self.generator.retriever().top_k(),
            concurrency = self.concurrency,
            "retrieval complete; starting generation"
        );

        let mut pipelines = std::pin::pin!(
            stream::iter(batch.into_iter().zip(rankings))
                .map(|((id, item), ranking)| async move {
                    let record = self.evaluate_query(id, &item, ranking).await;
                    (id, record)
                })
                .buffer_unordered(self.concurrency)
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        completed = summary.completed,
                        requested,
                        "evaluation cancelled; keeping completed records"
                    );
                    summary.cancelled = true;
                    break;
                }
                next = pipelines.next() => match next {
                    Some((id, record)) => {
                        results.insert(id, record?).await?;
                        summary.completed += 1;
                        debug!(query = id, completed = summary.completed, requested, "query done");
                    }
                    None => break,
                }
            }
        }

        info!(
            completed = summary.completed,
            requested,
            cancelled = summary.cancelled,
            "evaluation finished"
        );
        Ok(summary)
    }
}
