// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::Cli;
use crate::config::RetrievalConfig;
use crate::embeddings::load_embedder;
use crate::rag::{LoadOutcome, Passage, RetrievalService, TextChunker};

/// Arguments for ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Text files to index
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Source label (defaults to each file's name)
    #[arg(long)]
    pub source: Option<String>,
}

/// Arguments for query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Question or search text
    pub text: String,

    /// Number of results (defaults to RAG_DEFAULT_TOP_K)
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Minimum similarity score
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for context command
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Question to assemble context for
    pub text: String,

    /// Token budget (defaults to RAG_CONTEXT_MAX_TOKENS)
    #[arg(long)]
    pub max_tokens: Option<usize>,
}

/// Arguments for remove command
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Source label to remove
    pub source: String,
}

/// Resolve configuration: file or environment, then command-line overrides
pub fn load_config(cli: &Cli) -> Result<RetrievalConfig> {
    let mut config = match &cli.config {
        Some(path) => RetrievalConfig::from_file(path)?,
        None => RetrievalConfig::from_env(),
    };
    if let Some(dir) = &cli.index_dir {
        config.index_dir = dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.embedder.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

fn open_service(config: &RetrievalConfig) -> Result<RetrievalService> {
    let embedder = load_embedder(&config.embedder)?;
    let service = RetrievalService::new(config, embedder)?;
    if let LoadOutcome::Recovered(reason) = service.load_outcome() {
        println!("⚠️  Stored index was unreadable and has been reset: {}", reason);
    }
    Ok(service)
}

/// Next chunk id per source, so several files ingested under one label
/// get distinct chunk ids
#[derive(Debug, Default)]
struct ChunkNumbering {
    next: HashMap<String, u64>,
}

impl ChunkNumbering {
    fn chunk(&mut self, chunker: &TextChunker, text: &str, source: &str) -> Vec<Passage> {
        let next = self.next.entry(source.to_string()).or_insert(0);
        let passages = chunker.chunk_passages_from(text, source, *next);
        *next += passages.len() as u64;
        passages
    }
}

fn source_label(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

pub fn ingest(config: &RetrievalConfig, args: IngestArgs) -> Result<()> {
    let service = open_service(config)?;
    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap);
    let mut numbering = ChunkNumbering::default();

    let mut total = 0;
    for file in &args.files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let source = match &args.source {
            Some(source) => source.clone(),
            None => source_label(file)?,
        };

        let passages = numbering.chunk(&chunker, &text, &source);
        let report = service.ingest_passages(None, passages)?;
        info!("Ingested {} ({} chunks)", source, report.accepted_count);
        println!("📄 {}: {} passages", source, report.accepted_count);
        total += report.accepted_count;
    }

    println!("✅ Indexed {} passages from {} files", total, args.files.len());
    Ok(())
}

pub fn query(config: &RetrievalConfig, args: QueryArgs) -> Result<()> {
    let service = open_service(config)?;
    let k = args.k.unwrap_or(config.default_top_k);
    let threshold = args.threshold.unwrap_or(config.similarity_threshold);
    let results = service.query(None, &args.text, k, threshold)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching passages");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "\n#{} score={:.4} source={}",
            rank + 1,
            result.score,
            result.metadata.source()
        );
        println!("{}", result.content);
    }
    Ok(())
}

pub fn context(config: &RetrievalConfig, args: ContextArgs) -> Result<()> {
    let service = open_service(config)?;
    let max_tokens = args.max_tokens.unwrap_or(config.context_max_tokens);
    let context = service.relevant_context(None, &args.text, max_tokens)?;
    println!("{}", context);
    Ok(())
}

pub fn remove(config: &RetrievalConfig, args: RemoveArgs) -> Result<()> {
    let service = open_service(config)?;
    let removed = service.remove_source(None, &args.source)?;
    println!("🗑️  Removed {} passages from {}", removed, args.source);
    Ok(())
}

pub fn stats(config: &RetrievalConfig) -> Result<()> {
    let service = open_service(config)?;
    let stats = service.stats(None)?;

    println!("\n📊 Index Statistics:");
    println!("  Model:     {} ({}D)", stats.model_name, stats.embedding_dimension);
    println!("  Passages:  {}", stats.total_passages);
    println!("  Sources:   {}", stats.total_sources);
    for (source, count) in &stats.sources {
        println!("    {:<40} {}", source, count);
    }
    if !stats.content_types.is_empty() {
        println!("  Content types:");
        for (content_type, count) in &stats.content_types {
            println!("    {:<12} {}", content_type, count);
        }
    }
    Ok(())
}

pub fn clear(config: &RetrievalConfig) -> Result<()> {
    let service = open_service(config)?;
    service.clear(None)?;
    println!("✅ Cleared index at {}", config.index_dir.display());
    Ok(())
}
