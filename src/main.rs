//! RAG Evaluator CLI
//!
//! Index a corpus, embed it, evaluate a question set and compute metrics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_evaluator::{
    config::{Config, EmbeddingBackend},
    embeddings::{EmbeddingGateway, HttpEmbeddingGateway},
    evaluation::EvaluationSummary,
    llm::LlmClient,
    metrics::MetricsReport,
    persistence::{artifact_exists, artifact_size, load_embeddings, load_index, load_results},
    pipeline::{self, Collaborators},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// RAG Evaluator - chunk, retrieve, generate and judge
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk the corpus directory into an index
    Index,

    /// Embed every chunk of the index
    Embed,

    /// Generate and judge answers for the question set
    Evaluate,

    /// Compute generation and retrieval metrics from the results file
    Metrics,

    /// Run index, embed, evaluate and metrics in order
    Run,

    /// Retrieve the chunks closest to a query
    Search {
        /// The search query
        query: String,

        /// Number of results to return (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show information about the pipeline artifacts
    Info,

    /// Test LLM and embedding connections
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Index => cmd_index(&config),
        Commands::Embed => cmd_embed(&config).await,
        Commands::Evaluate => cmd_evaluate(&config).await,
        Commands::Metrics => cmd_metrics(&config),
        Commands::Run => cmd_run(&config).await,
        Commands::Search { query, top_k } => cmd_search(&config, &query, top_k).await,
        Commands::Info => cmd_info(&config),
        Commands::Test => cmd_test(&config).await,
    }
}

fn build_gateway(config: &Config) -> Result<Arc<dyn EmbeddingGateway>> {
    config
        .validate_embedding()
        .context("Invalid embedding configuration")?;

    match config.embedding.backend {
        EmbeddingBackend::Http => Ok(Arc::new(
            HttpEmbeddingGateway::new(&config.embedding)
                .context("Failed to create embedding client")?,
        )),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(
            rag_evaluator::embeddings::LocalEmbeddingGateway::load(&config.embedding.model)
                .context("Failed to load local embedding model")?,
        )),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => anyhow::bail!(
            "embedding.backend is 'local' but this binary was built without the 'local-embeddings' feature"
        ),
    }
}

fn build_collaborators(config: &Config) -> Result<Collaborators> {
    config.validate().context("Invalid configuration")?;

    let client = Arc::new(LlmClient::new(config.llm.clone()).context("Failed to create LLM client")?);
    Ok(Collaborators {
        embeddings: build_gateway(config)?,
        generation: client.clone(),
        judge: client,
    })
}

/// Token cancelled on Ctrl-C, so a long evaluation keeps its finished records.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted; finishing with the completed queries...");
            trigger.cancel();
        }
    });
    token
}

fn cmd_index(config: &Config) -> Result<()> {
    println!("Indexing: {}", config.indexing.documents_dir.display());
    println!(
        "  Chunk size: {}  Overlap: {}",
        config.indexing.chunk_size, config.indexing.chunk_overlap
    );

    let start = Instant::now();
    let index = pipeline::run_indexing(config).context("Indexing failed")?;

    println!("\nIndex Built:");
    println!("  Documents:   {}", index.document_count());
    println!("  Chunks:      {}", index.len());
    println!("  Build time:  {:.2?}", start.elapsed());
    println!("\nIndex saved to: {}", config.indexing.index_file.display());

    Ok(())
}

async fn cmd_embed(config: &Config) -> Result<()> {
    let gateway = build_gateway(config)?;

    println!("Embedding index: {}", config.indexing.index_file.display());
    println!("Using model: {}", config.embedding.model);

    let start = Instant::now();
    let matrix = pipeline::run_embedding(config, gateway.as_ref())
        .await
        .context("Embedding failed")?;

    println!("\nEmbeddings:");
    println!("  Rows:        {}", matrix.rows());
    println!("  Dimension:   {}", matrix.dim());
    println!("  Time:        {:.2?}", start.elapsed());
    println!(
        "\nEmbeddings saved to: {}",
        config.retrieval.embedding_file.display()
    );

    Ok(())
}

fn print_evaluation(config: &Config, summary: &EvaluationSummary) {
    println!("\nEvaluation:");
    println!("  Requested:   {}", summary.requested);
    println!("  Completed:   {}", summary.completed);
    if summary.cancelled {
        println!("  (cancelled; partial results kept)");
    }
    println!(
        "\nResults saved to: {}",
        config.evaluation.results_file.display()
    );
}

fn print_metrics(config: &Config, report: &MetricsReport) {
    let generation = &report.generation.generation;
    let retrieval = &report.retrieval;

    println!("\nGeneration ({} queries):", report.generation.total);
    println!("  Correct:          {:.3}", generation.correct);
    println!("  Undecided:        {:.3}", generation.undecided);
    println!("  Incorrect:        {:.3}", generation.incorrect);
    println!("  Wrong evaluator:  {:.3}", generation.wrong_evaluator);

    println!("\nRetrieval (k = {}):", retrieval.k);
    println!(
        "  Hit rate:  {:.3} ± {:.3}",
        retrieval.avg_hit_rate, retrieval.std_hit_rate
    );
    println!(
        "  NDCG:      {:.3} ± {:.3}",
        retrieval.avg_ndcg, retrieval.std_ndcg
    );

    println!(
        "\nMetrics saved to: {} and {}",
        config.evaluation.metrics_file.display(),
        config.evaluation.retrieval_metrics_file.display()
    );
}

async fn cmd_evaluate(config: &Config) -> Result<()> {
    let collaborators = build_collaborators(config)?;

    println!("Evaluating: {}", config.evaluation.qs_file.display());
    println!(
        "Using model: {} (judge: {})",
        config.llm.model,
        config.judge_model()
    );

    let start = Instant::now();
    let summary = pipeline::run_evaluation(config, &collaborators, &cancel_on_ctrl_c())
        .await
        .context("Evaluation failed")?;

    print_evaluation(config, &summary);
    println!("  Time: {:.2?}", start.elapsed());
    Ok(())
}

fn cmd_metrics(config: &Config) -> Result<()> {
    let report = pipeline::run_metrics(config).context("Metrics computation failed")?;
    print_metrics(config, &report);
    Ok(())
}

async fn cmd_run(config: &Config) -> Result<()> {
    let collaborators = build_collaborators(config)?;

    let start = Instant::now();
    let summary = pipeline::run_all(config, &collaborators, &cancel_on_ctrl_c())
        .await
        .context("Pipeline failed")?;

    println!("Indexed {} chunks", summary.chunks);
    print_evaluation(config, &summary.evaluation);
    match &summary.metrics {
        Some(report) => print_metrics(config, report),
        None => println!("\nNo completed queries; metrics skipped."),
    }
    println!("\nTotal time: {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let gateway = build_gateway(config)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    println!("Searching for: \"{}\"", query);
    println!();

    let start = Instant::now();
    let hits = pipeline::run_search(config, gateway, query, top_k)
        .await
        .context("Search failed")?;

    println!("Results:");
    println!("{}", "─".repeat(60));
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. chunk {} ({} #{}, chars {}-{}) score {:.4}",
            i + 1,
            hit.id,
            hit.chunk.file_name,
            hit.chunk.chunk_index,
            hit.chunk.start_chr,
            hit.chunk.end_chr,
            hit.score
        );
        let preview: String = hit.chunk.text.chars().take(200).collect();
        for line in preview.lines().take(3) {
            println!("      {}", line);
        }
        if hit.chunk.text.chars().count() > 200 {
            println!("      ...");
        }
        println!();
    }
    println!("{}", "─".repeat(60));
    println!("Found {} results in {:.2?}", hits.len(), start.elapsed());

    Ok(())
}

fn cmd_info(config: &Config) -> Result<()> {
    let index_path = &config.indexing.index_file;
    let embedding_path = &config.retrieval.embedding_file;
    let results_path = &config.evaluation.results_file;

    println!("Pipeline Artifacts");
    println!("{}", "─".repeat(40));

    if artifact_exists(index_path) {
        let index = load_index(index_path).context("Failed to load index")?;
        println!("  Index:        {}", index_path.display());
        println!("    Documents:  {}", index.document_count());
        println!("    Chunks:     {}", index.len());
        println!(
            "    File size:  {:.1} KB",
            artifact_size(index_path)? as f64 / 1024.0
        );
    } else {
        println!("  Index:        missing (run 'index')");
    }

    if artifact_exists(embedding_path) {
        let matrix = load_embeddings(embedding_path).context("Failed to load embeddings")?;
        println!("  Embeddings:   {}", embedding_path.display());
        println!("    Rows:       {}", matrix.rows());
        println!("    Dimension:  {}", matrix.dim());
    } else {
        println!("  Embeddings:   missing (run 'embed')");
    }

    if artifact_exists(results_path) {
        let results = load_results(results_path).context("Failed to load results")?;
        println!("  Results:      {}", results_path.display());
        println!("    Queries:    {}", results.len());
    } else {
        println!("  Results:      missing (run 'evaluate')");
    }

    Ok(())
}

async fn cmd_test(config: &Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate_llm() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm.clone())?;

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    println!("\nTesting embedding gateway ({})...", config.embedding.model);
    let gateway = match build_gateway(config) {
        Ok(gateway) => gateway,
        Err(e) => {
            println!("Configuration error: {:#}", e);
            return Ok(());
        }
    };
    match gateway
        .embed(&["hello".to_string()], &config.embedding.model, 1)
        .await
    {
        Ok(matrix) => println!("Embedding successful! (dimension {})", matrix.dim()),
        Err(e) => println!("Embedding failed: {}", e),
    }

    Ok(())
}
