//! CLI command runners. Each opens the engine, runs one operation, and
//! prints a human-readable result to stdout.

use anyhow::{bail, Context, Result};
use rag_engine_core::chat::ChatRequest;
use rag_engine_core::models::{ConversationTurn, Metadata};
use rag_engine_core::Metric;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::engine::{AddChunk, Engine, Query};

pub struct AddArgs {
    pub content: Option<String>,
    pub file: Option<PathBuf>,
    pub document_id: Option<String>,
    pub chunk_index: Option<i64>,
    pub metadata: Option<String>,
}

pub async fn run_add(config: &Config, args: AddArgs) -> Result<()> {
    let content = match (args.content, &args.file) {
        (Some(_), Some(_)) => bail!("Pass either CONTENT or --file, not both."),
        (Some(content), None) => content,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Nothing to add. Pass CONTENT or --file."),
    };
    let metadata = match args.metadata {
        Some(raw) => parse_metadata(&raw)?,
        None => Metadata::new(),
    };

    let engine = Engine::open(config).await?;
    let added = engine
        .add_chunk(AddChunk {
            content,
            metadata,
            document_id: args.document_id,
            chunk_index: args.chunk_index,
        })
        .await?;

    println!(
        "Added chunk {} (document {}, index {}; {} chunks indexed).",
        added.chunk_id,
        added.document_id,
        added.chunk_index,
        engine.index().count()
    );
    Ok(())
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    match serde_json::from_str::<serde_json::Value>(raw)
        .with_context(|| "--metadata must be a JSON object")?
    {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("--metadata must be a JSON object"),
    }
}

pub async fn run_query(
    config: &Config,
    text: &str,
    search_type: &str,
    top_k: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let metric: Metric = search_type.parse()?;
    let engine = Engine::open(config).await?;

    let mut query = Query::new(text, top_k.unwrap_or_else(|| engine.default_top_k()));
    query.metric = metric;
    query.threshold = threshold;

    let hits = engine.query(&query).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        match hit.rerank_score {
            Some(rerank) => println!(
                "{}. [{:.4}, rerank {:.4}] chunk {}",
                i + 1,
                hit.score,
                rerank,
                hit.chunk_id
            ),
            None => println!("{}. [{:.4}] chunk {}", i + 1, hit.score, hit.chunk_id),
        }
        println!("    document: {} #{}", hit.document_id, hit.chunk_index);
        if !hit.metadata.is_empty() {
            println!("    metadata: {}", serde_json::Value::Object(hit.metadata.clone()));
        }
        println!("    {}", snippet(&hit.content, 240));
        println!();
    }
    Ok(())
}

pub struct ChatArgs {
    pub message: String,
    pub history: Option<PathBuf>,
    pub search_type: String,
    pub top_k: usize,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

pub async fn run_chat(config: &Config, args: ChatArgs) -> Result<()> {
    let mut request = ChatRequest::new(args.message);
    request.metric = args.search_type.parse()?;
    request.top_k = args.top_k;
    request.temperature = args.temperature;
    request.system_prompt = args.system_prompt;
    if let Some(path) = &args.history {
        request.history = load_history(path)?;
    }

    let engine = Engine::open(config).await?;
    let response = engine.chat(request).await?;

    println!("{}", response.response);
    println!();
    println!(
        "model: {}  context chunks: {}",
        response.model, response.context_used
    );
    for (i, chunk) in response.chunks_used.iter().enumerate() {
        println!(
            "  [Context {}] chunk {} ({:.4}) {}",
            i + 1,
            chunk.chunk_id,
            chunk.score,
            snippet(&chunk.content, 80)
        );
    }
    Ok(())
}

/// Read a JSON array of `{"role": "user"|"assistant", "content": "..."}`.
pub fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid history file: {}", path.display()))
}

pub async fn run_info(config: &Config) -> Result<()> {
    let engine = Engine::open(config).await?;
    let info = engine.info().await?;

    println!("Database:   {}", config.db.path.display());
    println!("Chunks:     {}", info.index.total_chunks);
    match info.index.dims {
        Some(dims) => println!("Dimension:  {}", dims),
        None => println!("Dimension:  (unset)"),
    }
    println!("Normalize:  {}", info.index.normalize);
    println!("Embedding:  {}", info.embedding_model);
    println!("Generation: {}", info.generation_model);
    println!(
        "Reranker:   {}",
        info.reranker.as_deref().unwrap_or("disabled")
    );
    Ok(())
}

fn snippet(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}
