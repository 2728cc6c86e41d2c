//! # RAG Relay CLI (`rag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag serve <service>` | Run one service, or `all` of them in one process |
//! | `rag ingest <file>` | Ingest a local document |
//! | `rag query "<q>"` | Retrieve and synthesize an answer in process |
//! | `rag chunk <file>` | Show how a document would be chunked |
//!
//! ## Examples
//!
//! ```bash
//! rag serve all --config ./config/rag.toml
//! rag ingest ./handbook.pdf --user-id alice --dry-run
//! rag query "What is the refund policy?" --user-id alice
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_relay::config::{self, Config};
use rag_relay::embedding::OpenAiEmbedder;
use rag_relay::ingest::{estimate_chunk_cost, prepare_chunks, IngestionPipeline};
use rag_relay::llm::OpenAiChatModel;
use rag_relay::logging::init_logging;
use rag_relay::pinecone::create_index;
use rag_relay::retrieve::{RetrievalPipeline, Retriever};
use rag_relay::server::{build_apps, run_apps, ServeTarget};
use rag_relay::synthesize::SynthesisPipeline;
use rag_relay_core::models::{IngestOptions, RetrievalRequest, DEFAULT_USER_ID};

/// RAG Relay: document ingestion, retrieval and grounded answers.
#[derive(Parser)]
#[command(name = "rag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP services.
    Serve {
        /// Which service to run. `all` runs the four in one process.
        #[arg(value_enum)]
        target: ServeTarget,
    },

    /// Ingest a local document into the vector index.
    Ingest {
        file: PathBuf,

        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,

        /// Characters per chunk (defaults to `ingestion.chunk_size`).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks.
        #[arg(long)]
        overlap: Option<usize>,

        /// Print chunk count, tokens and estimated cost without calling
        /// any provider.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question from the indexed documents.
    Query {
        query: String,

        #[arg(long, default_value = DEFAULT_USER_ID)]
        user_id: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print the chunk windows for a document.
    Chunk {
        file: PathBuf,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        overlap: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Offline commands run without a config file, but a file that exists
    // must still parse and validate.
    let offline = matches!(
        cli.command,
        Commands::Chunk { .. } | Commands::Ingest { dry_run: true, .. }
    );
    let cfg = if offline && !cli.config.exists() {
        Config::minimal()
    } else {
        config::load_config(&cli.config)?
    };
    init_logging(&cfg.app);
    let cfg = Arc::new(cfg);

    match cli.command {
        Commands::Serve { target } => {
            let apps = build_apps(cfg, target)?;
            run_apps(apps).await?;
        }
        Commands::Ingest {
            file,
            user_id,
            chunk_size,
            overlap,
            dry_run,
        } => {
            let options = IngestOptions {
                user_id,
                chunk_size,
                overlap,
            };
            if dry_run {
                run_dry_ingest(&cfg, &file, &options)?;
            } else {
                run_ingest(cfg, &file, &options).await?;
            }
        }
        Commands::Query {
            query,
            user_id,
            top_k,
        } => {
            run_query(&cfg, query, user_id, top_k).await?;
        }
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
        } => {
            run_chunk(
                &file,
                chunk_size.unwrap_or(cfg.ingestion.chunk_size),
                overlap.unwrap_or(cfg.ingestion.chunk_overlap),
            )?;
        }
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    Ok((bytes, file_name))
}

fn run_dry_ingest(cfg: &Config, path: &Path, options: &IngestOptions) -> Result<()> {
    let (bytes, file_name) = read_document(path)?;
    let chunk_size = options.chunk_size.unwrap_or(cfg.ingestion.chunk_size);
    let overlap = options.overlap.unwrap_or(cfg.ingestion.chunk_overlap);
    let chunks = prepare_chunks(&bytes, &file_name, chunk_size, overlap)?;
    let (tokens, cost) = estimate_chunk_cost(&chunks, &cfg.openai.embedding_model);

    println!("Dry run: {}", file_name);
    println!("  chunks: {}", chunks.len());
    println!("  embedding tokens (est.): {}", tokens);
    println!(
        "  embedding cost (est.): ${:.6} ({})",
        cost, cfg.openai.embedding_model
    );
    Ok(())
}

async fn run_ingest(cfg: Arc<Config>, path: &Path, options: &IngestOptions) -> Result<()> {
    let (bytes, file_name) = read_document(path)?;
    let embedder = Arc::new(OpenAiEmbedder::new(
        &cfg.openai,
        cfg.ingestion.embedding_batch_size,
    )?);
    let index = create_index(&cfg)?;
    let pipeline = IngestionPipeline::new(cfg, embedder, index);

    let response = pipeline.ingest(&bytes, &file_name, options).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_query(
    cfg: &Config,
    query: String,
    user_id: String,
    top_k: Option<usize>,
) -> Result<()> {
    let embedder = Arc::new(OpenAiEmbedder::new(
        &cfg.openai,
        cfg.ingestion.embedding_batch_size,
    )?);
    let retriever = RetrievalPipeline::new(embedder, create_index(cfg)?, cfg.retrieval.max_top_k);
    let synthesizer = SynthesisPipeline::new(
        Arc::new(OpenAiChatModel::new(&cfg.openai)?),
        cfg.synthesis.context_budget_tokens,
    );

    let retrieval = retriever
        .retrieve(RetrievalRequest::new(
            query.clone(),
            user_id,
            top_k.unwrap_or(cfg.synthesis.retrieval_top_k),
        ))
        .await?;
    let response = synthesizer
        .synthesize(
            &query,
            &retrieval,
            cfg.frontend.max_tokens,
            cfg.frontend.temperature,
        )
        .await?;

    println!("{}\n", response.answer);
    if !response.citations.is_empty() {
        println!("Sources:");
        for (i, citation) in response.citations.iter().enumerate() {
            let page = citation
                .page
                .map(|p| format!(" (page {})", p))
                .unwrap_or_default();
            let source = if citation.source_url.is_empty() {
                citation.doc_id.as_str()
            } else {
                citation.source_url.as_str()
            };
            println!("  [{}] {}{}", i + 1, source, page);
        }
    }
    println!(
        "\n{} tokens, ${:.6}, {:.0} ms",
        response.tokens_used,
        response.cost_estimate,
        retrieval.retrieval_latency_ms + response.synthesis_latency_ms
    );
    Ok(())
}

fn run_chunk(path: &Path, chunk_size: usize, overlap: usize) -> Result<()> {
    let (bytes, file_name) = read_document(path)?;
    let chunks = prepare_chunks(&bytes, &file_name, chunk_size, overlap)?;

    println!(
        "{}: {} chunks (size {}, overlap {})",
        file_name,
        chunks.len(),
        chunk_size,
        overlap
    );
    for chunk in &chunks {
        let page = chunk
            .page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let preview: String = chunk.text.chars().take(60).collect();
        println!(
            "#{:<4} [{}..{}) page {:<3} {}",
            chunk.index,
            chunk.start,
            chunk.end,
            page,
            preview.replace('\n', " ")
        );
    }
    Ok(())
}
