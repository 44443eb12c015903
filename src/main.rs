//! # RAG Engine CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag add "<text>"` | Embed and store one chunk |
//! | `rag query "<query>"` | Similarity search |
//! | `rag chat "<message>"` | One retrieval-augmented chat turn |
//! | `rag info` | Show index and provider status |
//! | `rag serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=rag_engine=debug`) to
//! adjust verbosity.

use clap::{Parser, Subcommand};
use rag_engine::commands::{self, AddArgs, ChatArgs};
use rag_engine::{config, migrate, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RAG Engine: a local-first retrieval-augmented chat engine.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG Engine: retrieval-augmented chat over a persistent vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Embed a chunk of text and add it to the index.
    Add {
        /// Text to add. Omit when using --file.
        content: Option<String>,

        /// Read the chunk text from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Document the chunk belongs to. A UUID is generated when omitted.
        #[arg(long)]
        document_id: Option<String>,

        /// Position of the chunk within its document.
        #[arg(long)]
        chunk_index: Option<i64>,

        /// Metadata as a JSON object, e.g. '{"source":"notes.md"}'.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Search the index.
    Query {
        query: String,

        /// Similarity metric: cosine, l2, or inner_product.
        #[arg(long, default_value = "cosine")]
        search_type: String,

        /// Number of results (defaults to retrieval.default_top_k).
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results whose similarity is below this value.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Ask a question grounded in the indexed chunks.
    Chat {
        message: String,

        /// JSON file with prior turns: [{"role":"user","content":"..."}, ...].
        #[arg(long)]
        history: Option<PathBuf>,

        /// Similarity metric: cosine, l2, or inner_product.
        #[arg(long, default_value = "cosine")]
        search_type: String,

        /// Chunks to retrieve (1-10).
        #[arg(long, default_value_t = 3)]
        top_k: usize,

        /// Sampling temperature (0.0-1.0).
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Override the system prompt for this turn.
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Show index and provider status.
    Info,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            content,
            file,
            document_id,
            chunk_index,
            metadata,
        } => {
            commands::run_add(
                &cfg,
                AddArgs {
                    content,
                    file,
                    document_id,
                    chunk_index,
                    metadata,
                },
            )
            .await?;
        }
        Commands::Query {
            query,
            search_type,
            top_k,
            threshold,
        } => {
            commands::run_query(&cfg, &query, &search_type, top_k, threshold).await?;
        }
        Commands::Chat {
            message,
            history,
            search_type,
            top_k,
            temperature,
            system_prompt,
        } => {
            commands::run_chat(
                &cfg,
                ChatArgs {
                    message,
                    history,
                    search_type,
                    top_k,
                    temperature,
                    system_prompt,
                },
            )
            .await?;
        }
        Commands::Info => {
            commands::run_info(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
