// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EmbedderBackend;

/// Document QA retrieval CLI
#[derive(Parser, Debug)]
#[command(name = "docqa-cli")]
#[command(version)]
#[command(about = "Index text documents and search them by meaning", long_about = None)]
pub struct Cli {
    /// TOML configuration file (environment variables are used otherwise)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted index
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Embedding backend (onnx or hashing)
    #[arg(long, global = true)]
    pub backend: Option<EmbedderBackend>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk and index one or more UTF-8 text files
    Ingest(commands::IngestArgs),

    /// Search the index
    Query(commands::QueryArgs),

    /// Print the assembled context for a question
    Context(commands::ContextArgs),

    /// Remove every passage of a source
    Remove(commands::RemoveArgs),

    /// Show index statistics
    Stats,

    /// Delete the index
    Clear,
}

/// Execute CLI command
pub fn execute(cli: Cli) -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let config = commands::load_config(&cli)?;
    match cli.command {
        Commands::Ingest(args) => commands::ingest(&config, args),
        Commands::Query(args) => commands::query(&config, args),
        Commands::Context(args) => commands::context(&config, args),
        Commands::Remove(args) => commands::remove(&config, args),
        Commands::Stats => commands::stats(&config),
        Commands::Clear => commands::clear(&config),
    }
}
