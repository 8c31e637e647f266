//! # lexrag CLI
//!
//! Ingest legal PDFs and ask grounded questions about them.
//!
//! ## Usage
//!
//! ```bash
//! lexrag --config ./config/lexrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexrag init` | Create the configured index (SQLite schema) |
//! | `lexrag ingest <FILE>...` | Extract, chunk, embed and index PDFs |
//! | `lexrag ask "<query>"` | Answer a question with citations |
//! | `lexrag documents` | List indexed documents |
//! | `lexrag delete <ID>` | Remove a document from the index |
//! | `lexrag serve` | Start the HTTP server |
//!
//! Without `--config` every setting takes its default: an in-memory
//! index, the offline hash embedder and the extractive synthesizer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lexrag::config::{load_config, Config};
use lexrag::index::SearchFilter;
use lexrag::models::{document_id_for, Answer, AnswerStatus, Document, IngestReport};
use lexrag::pipeline::{AnswerRequest, Pipeline};
use lexrag::server::run_server;

/// lexrag — question answering over legal PDF documents with citations.
#[derive(Parser)]
#[command(
    name = "lexrag",
    about = "Question answering over legal PDF documents with grounded citations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured index. Idempotent.
    Init,

    /// Ingest one or more PDF files.
    ///
    /// Re-ingesting a file with the same name replaces its previous
    /// entries (see `pipeline.reingest`).
    Ingest {
        /// PDF files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed documents.
    Ask {
        query: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,

        /// Restrict retrieval to a document (id or filename). Repeatable.
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Restrict retrieval to chunks covering this page.
        #[arg(long)]
        page: Option<u32>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove a document's entries from the index.
    Delete {
        /// Document id or filename.
        document: String,
    },

    /// List indexed documents.
    Documents,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };

    match cli.command {
        Commands::Init => {
            let backend = config.index.backend.clone();
            let pipeline = Pipeline::from_config(config).await?;
            println!("init");
            println!("  backend: {}", backend);
            println!("  dims: {}", pipeline.index().dims());
            println!("  metric: {}", pipeline.index().metric().as_str());
            println!("  entries: {}", pipeline.index().len().await?);
            println!("ok");
        }
        Commands::Ingest { files, json } => {
            if config.index.backend == "memory" {
                eprintln!("Warning: index.backend = memory; entries are discarded on exit");
            }
            let documents = read_documents(&files)?;
            let pipeline = Pipeline::from_config(config).await?;
            let report = pipeline.ingest(documents).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Ask {
            query,
            k,
            documents,
            page,
            json,
        } => {
            let pipeline = Pipeline::from_config(config).await?;
            let request = AnswerRequest {
                query,
                k,
                filter: SearchFilter {
                    document_ids: documents.iter().map(|d| resolve_document_id(d)).collect(),
                    page,
                },
            };
            let answer = pipeline
                .answer_request(request, &tokio_util::sync::CancellationToken::new())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Delete { document } => {
            let pipeline = Pipeline::from_config(config).await?;
            let id = resolve_document_id(&document);
            let removed = pipeline.delete_document(&id).await?;
            println!("delete {}", id);
            println!("  entries removed: {}", removed);
        }
        Commands::Documents => {
            let pipeline = Pipeline::from_config(config).await?;
            let documents = pipeline.documents().await?;
            if documents.is_empty() {
                println!("No documents indexed.");
            }
            for d in documents {
                println!(
                    "{}  {}  chunks: {}  pages: {}",
                    d.document_id, d.filename, d.chunks, d.pages
                );
            }
        }
        Commands::Serve => {
            let pipeline = Pipeline::from_config(config).await?;
            run_server(Arc::new(pipeline)).await?;
        }
    }

    Ok(())
}

fn read_documents(files: &[PathBuf]) -> Result<Vec<Document>> {
    files
        .iter()
        .map(|path| {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Document::new(display_name(path), bytes))
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Accept either a document id (UUID) or the filename it was ingested under.
fn resolve_document_id(value: &str) -> String {
    if uuid::Uuid::parse_str(value).is_ok() {
        value.to_string()
    } else {
        document_id_for(value)
    }
}

fn print_report(report: &IngestReport) {
    println!("ingest");
    println!("  documents: {}", report.documents.len());
    println!("  processed: {}", report.documents_processed);
    println!("  chunks indexed: {}", report.chunks_indexed);
    if report.chunks_reused > 0 {
        println!("  chunks reused: {}", report.chunks_reused);
    }
    println!("  chunks failed: {}", report.failed_chunk_ids.len());
    for d in report.failed_documents() {
        println!(
            "  FAILED {}: {}",
            d.filename,
            d.error.as_deref().unwrap_or("unknown error")
        );
    }
    for f in &report.chunk_failures {
        println!("  failed chunk {}: {}", f.chunk_id, f.error);
    }
    if report.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}

fn print_answer(answer: &Answer) {
    match answer.status {
        AnswerStatus::Grounded | AnswerStatus::InsufficientInformation => {
            println!("{}", answer.answer_text)
        }
        AnswerStatus::Degraded => println!(
            "Answer synthesis unavailable ({}). Relevant passages:",
            answer.degraded_reason.as_deref().unwrap_or("unknown error")
        ),
    }

    if answer.cited_chunk_ids.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for id in &answer.cited_chunk_ids {
        match answer.retrieval_scores.iter().find(|s| &s.chunk_id == id) {
            Some(s) if s.page_start == s.page_end => println!(
                "  [^{}] {} p.{} (score {:.4})",
                id, s.filename, s.page_start, s.score
            ),
            Some(s) => println!(
                "  [^{}] {} pp.{}-{} (score {:.4})",
                id, s.filename, s.page_start, s.page_end, s.score
            ),
            None => println!("  [^{}]", id),
        }
    }
}
