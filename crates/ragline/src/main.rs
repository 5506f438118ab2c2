//! # ragline CLI
//!
//! The `ragline` binary serves the HTTP API and offers one-shot commands
//! for ingesting and querying a directory of documents. The indexes are
//! process-local, so the one-shot `search` and `ask` commands take a
//! `--path` to ingest before querying.
//!
//! ## Usage
//!
//! ```bash
//! ragline --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline serve` | Start the HTTP server |
//! | `ragline ingest <path>` | Ingest a file or directory, print per-file results |
//! | `ragline search "<query>" --path <dir>` | Ingest then search |
//! | `ragline ask "<message>" --path <dir>` | Ingest then run one chat turn |
//! | `ragline stats --path <dir>` | Ingest then print corpus statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Serve the API with hybrid search and chat
//! OPENAI_API_KEY=… ragline --config ./config/ragline.toml serve
//!
//! # Keyword search over a docs directory, no API key needed
//! ragline search "deployment checklist" --path ./docs --mode lexical
//!
//! # One-shot grounded answer
//! OPENAI_API_KEY=… ragline ask "how do we rotate credentials?" --path ./docs
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragline::config::{self, Config};
use ragline::engine::{IngestRequest, RagEngine};
use ragline::ingest_fs;
use ragline::providers;
use ragline::server;
use ragline_core::pipeline::AnswerRequest;
use ragline_core::search::SearchMode;

/// ragline — retrieval-augmented chat over your documents.
#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Retrieval-augmented chat backend with hybrid keyword + vector search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Exposes the /documents, /search, /chat, and /health endpoints on
    /// the configured bind address.
    Serve,

    /// Ingest a file or directory and print per-file results.
    ///
    /// Directories are walked with the configured include globs. One bad
    /// file never aborts the batch.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
    },

    /// Search indexed documents.
    ///
    /// Because the index is process-local, pass --path to ingest a file
    /// or directory first.
    Search {
        /// The search query string.
        query: String,

        /// File or directory to ingest before searching.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Search mode: `lexical`, `vector`, or `hybrid`.
        #[arg(long, default_value = "lexical")]
        mode: String,

        /// Blend weight for hybrid mode (vector share, 0.0–1.0).
        #[arg(long)]
        alpha: Option<f64>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask one question over ingested documents (one chat turn).
    Ask {
        /// The question to answer.
        message: String,

        /// File or directory to ingest before answering.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Session id to thread history under.
        #[arg(long)]
        session: Option<String>,

        /// Ignore stored history for this turn.
        #[arg(long)]
        no_history: bool,
    },

    /// Print corpus statistics after ingesting a path.
    Stats {
        /// File or directory to ingest first.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        let cfg = Config::default();
        config::validate(&cfg)?;
        cfg
    };

    let embedder = providers::create_embedder(&cfg.embedding, cfg.vector.dims)?;
    let generator = providers::create_generator(&cfg.generation)?;
    let engine = Arc::new(RagEngine::new(cfg, embedder, generator)?);

    match cli.command {
        Commands::Serve => {
            server::run_server(engine).await?;
        }
        Commands::Ingest { path } => {
            ingest_path(&engine, &path).await?;
        }
        Commands::Search {
            query,
            path,
            mode,
            alpha,
            limit,
        } => {
            if let Some(path) = path {
                ingest_path(&engine, &path).await?;
            }
            let mode = SearchMode::parse(&mode, alpha, engine.default_alpha())?;
            let results = engine.search(&query, limit, mode).await?;

            if results.is_empty() {
                println!("No results.");
            }
            for r in &results {
                println!(
                    "{:>2}. [{:.3}] {} (chunk {} of {})",
                    r.rank, r.score, r.filename, r.chunk_id, r.document_id
                );
                println!("    {}", snippet(&r.text, 160));
            }
        }
        Commands::Ask {
            message,
            path,
            session,
            no_history,
        } => {
            if let Some(path) = path {
                ingest_path(&engine, &path).await?;
            }
            let answer = engine
                .chat(AnswerRequest {
                    query: message,
                    session_id: session,
                    use_history: !no_history,
                    limit: None,
                    mode: None,
                })
                .await?;

            println!("{}", answer.response);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for (i, s) in answer.sources.iter().enumerate() {
                    println!("  [{}] {} ({:.3})", i + 1, s.filename, s.score);
                }
            }
            println!();
            println!("session: {}", answer.session_id);
        }
        Commands::Stats { path } => {
            if let Some(path) = path {
                ingest_path(&engine, &path).await?;
            }
            let stats = engine.stats();
            println!("Documents:   {}", stats.total_documents);
            println!("Chunks:      {}", stats.total_chunks);
            if !stats.documents.is_empty() {
                println!();
                println!("  {:<32} {:>8} {:>12}", "FILE", "CHUNKS", "CHARACTERS");
                println!("  {}", "-".repeat(56));
                for d in &stats.documents {
                    println!(
                        "  {:<32} {:>8} {:>12}",
                        d.filename, d.chunk_count, d.characters
                    );
                }
            }
        }
    }

    Ok(())
}

/// Ingest a file or directory, printing one line per file.
async fn ingest_path(engine: &RagEngine, path: &Path) -> Result<()> {
    let files = ingest_fs::scan_files(path, &engine.config().ingest.include_globs)?;
    if files.is_empty() {
        anyhow::bail!("no ingestable files under {}", path.display());
    }

    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        let bytes = std::fs::read(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        requests.push(IngestRequest::from_bytes(filename, bytes));
    }

    let mut ok = 0usize;
    let mut failed = 0usize;
    for (filename, outcome) in engine.ingest_batch(requests).await {
        match outcome {
            Ok(receipt) => {
                ok += 1;
                println!("  {} — {} chunks", filename, receipt.chunk_count);
            }
            Err(e) => {
                failed += 1;
                println!("  {} — error: {}", filename, e);
            }
        }
    }
    println!("ingested {} files ({} failed)", ok, failed);
    Ok(())
}

/// First line of a chunk, truncated for terminal display.
fn snippet(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}
