//! Stage drivers: index → embed → evaluate → metrics, each reading and writing
//! the artifacts named in the configuration.
//!
//! Collaborators are injected, so every stage runs the same against real
//! services or test stubs.

use crate::chunker::{Chunk, ChunkId, Index, build_index};
use crate::config::Config;
use crate::document::load_corpus;
use crate::embeddings::{EmbeddingGateway, EmbeddingMatrix, embed_index};
use crate::error::Result;
use crate::evaluation::{
    EvaluationSummary, Evaluator, QuerySelection, QuerySet, ResultsCollection,
};
use crate::generator::AnswerGenerator;
use crate::judge::Judge;
use crate::llm::CompletionOracle;
use crate::metrics::{MetricsReport, compute_all};
use crate::persistence::{
    load_embeddings, load_index, load_results, save_embeddings, save_index, save_json,
    save_results,
};
use crate::retriever::Retriever;
use crate::store::VectorStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// External services used by the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub embeddings: Arc<dyn EmbeddingGateway>,
    pub generation: Arc<dyn CompletionOracle>,
    pub judge: Arc<dyn CompletionOracle>,
}

/// Chunk the corpus directory and persist the index.
pub fn run_indexing(config: &Config) -> Result<Index> {
    let chunk_config = config.indexing.chunk_config();
    chunk_config.validate()?;

    let documents = load_corpus(&config.indexing.documents_dir)?;
    let index = build_index(&documents, chunk_config)?;
    save_index(&index, &config.indexing.index_file)?;

    info!(
        chunks = index.len(),
        path = %config.indexing.index_file.display(),
        "index written"
    );
    Ok(index)
}

/// Embed the persisted index and write the embedding matrix.
pub async fn run_embedding(
    config: &Config,
    gateway: &dyn EmbeddingGateway,
) -> Result<EmbeddingMatrix> {
    let index = load_index(&config.indexing.index_file)?;
    let matrix = embed_index(
        gateway,
        &index,
        &config.embedding.model,
        config.embedding.batch_size,
    )
    .await?;
    save_embeddings(&matrix, &config.retrieval.embedding_file)?;

    info!(
        rows = matrix.rows(),
        dim = matrix.dim(),
        path = %config.retrieval.embedding_file.display(),
        "embeddings written"
    );
    Ok(matrix)
}

/// Load the index and embedding artifacts into a retriever returning `top_k` chunks.
pub fn open_retriever(
    config: &Config,
    gateway: Arc<dyn EmbeddingGateway>,
    top_k: usize,
) -> Result<(Arc<Index>, Arc<Retriever>)> {
    let index = load_index(&config.indexing.index_file)?;
    let matrix = load_embeddings(&config.retrieval.embedding_file)?;
    let store = VectorStore::load_for_index(matrix, &index)?;

    let retriever = Retriever::new(
        Arc::new(store),
        gateway,
        config.embedding.model.clone(),
        config.embedding.batch_size,
        top_k,
    )?;
    Ok((Arc::new(index), Arc::new(retriever)))
}

/// Evaluate the selected queries and write the results artifact.
///
/// Whatever finished before a cancellation or a fatal error is still written.
pub async fn run_evaluation(
    config: &Config,
    collaborators: &Collaborators,
    cancel: &CancellationToken,
) -> Result<EvaluationSummary> {
    config.validate_pipeline()?;

    let queries = QuerySet::load_json(&config.evaluation.qs_file)?;
    let batch = queries.select(&QuerySelection {
        ids: config.evaluation.query_ids.clone(),
        limit: config.evaluation.max_queries,
    })?;

    let (index, retriever) = open_retriever(
        config,
        collaborators.embeddings.clone(),
        config.retrieval.top_k,
    )?;

    let generator = AnswerGenerator::new(
        retriever,
        index,
        collaborators.generation.clone(),
        config.llm.model.clone(),
        config.llm.temperature,
    );

    let mut judge = Judge::new(
        collaborators.judge.clone(),
        config.judge_model(),
        config.judge_temperature(),
    );
    if let Some(path) = &config.judge.prompt_path {
        judge = judge.with_system_prompt(Judge::load_system_prompt(path)?);
    }

    let evaluator = Evaluator::new(
        Arc::new(generator),
        Arc::new(judge),
        config.evaluation.concurrency,
    )?;

    let results = ResultsCollection::new();
    let outcome = evaluator.run(batch, &results, cancel).await;

    let records = results.snapshot().await;
    match &outcome {
        Ok(summary) if summary.cancelled => {
            warn!(records = records.len(), "saving partial results");
            save_results(&records, &config.evaluation.results_file)?;
        }
        Ok(_) => save_results(&records, &config.evaluation.results_file)?,
        Err(e) if !records.is_empty() => {
            warn!(error = %e, records = records.len(), "run failed; saving partial results");
            save_results(&records, &config.evaluation.results_file)?;
        }
        Err(_) => {}
    }

    outcome
}

/// Compute metrics from the results artifact and write both metrics files.
pub fn run_metrics(config: &Config) -> Result<MetricsReport> {
    let results = load_results(&config.evaluation.results_file)?;
    let report = compute_all(&results, config.metrics_k())?;

    save_json(&report.generation, &config.evaluation.metrics_file)?;
    save_json(&report.retrieval, &config.evaluation.retrieval_metrics_file)?;

    info!(
        queries = report.generation.total,
        k = report.retrieval.k,
        correct = report.generation.generation.correct,
        avg_hit_rate = report.retrieval.avg_hit_rate,
        avg_ndcg = report.retrieval.avg_ndcg,
        "metrics written"
    );
    Ok(report)
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub chunks: usize,
    pub evaluation: EvaluationSummary,
    /// Absent when nothing was evaluated before a cancellation.
    pub metrics: Option<MetricsReport>,
}

/// Run all four stages in order.
pub async fn run_all(
    config: &Config,
    collaborators: &Collaborators,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    config.validate_pipeline()?;

    let index = run_indexing(config)?;
    run_embedding(config, collaborators.embeddings.as_ref()).await?;
    let evaluation = run_evaluation(config, collaborators, cancel).await?;

    let metrics = if evaluation.completed > 0 {
        Some(run_metrics(config)?)
    } else {
        warn!("no completed queries; skipping metrics");
        None
    };

    Ok(RunSummary {
        chunks: index.len(),
        evaluation,
        metrics,
    })
}

/// One ranked chunk returned by an ad-hoc search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub chunk: Chunk,
}

/// Retrieve the `top_k` chunks for a free-text query.
pub async fn run_search(
    config: &Config,
    gateway: Arc<dyn EmbeddingGateway>,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>> {
    let (index, retriever) = open_retriever(config, gateway, top_k)?;
    let ranking = retriever.retrieve_one(query).await?;

    Ok(ranking
        .hits
        .into_iter()
        .filter_map(|hit| {
            index.get(hit.id).map(|chunk| SearchHit {
                id: hit.id,
                score: hit.score,
                chunk: chunk.clone(),
            })
        })
        .collect())
}
