// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the retrieval core

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rag::errors::{Result, RetrievalError};

/// Which embedding backend to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// all-MiniLM-L6-v2 through ONNX Runtime
    Onnx,
    /// Model-free feature hashing
    Hashing,
}

impl std::str::FromStr for EmbedderBackend {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(EmbedderBackend::Onnx),
            "hashing" | "hash" => Ok(EmbedderBackend::Hashing),
            other => Err(RetrievalError::InvalidConfig(format!(
                "unknown embedding backend '{}' (expected onnx or hashing)",
                other
            ))),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model_name: String,
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Path to tokenizer JSON file
    pub tokenizer_path: PathBuf,
    /// Expected embedding dimensions
    pub dimension: usize,
    /// Texts per inference call
    pub batch_size: usize,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::Onnx,
            model_name: "all-MiniLM-L6-v2".to_string(),
            model_path: PathBuf::from("./models/all-MiniLM-L6-v2-onnx/model.onnx"),
            tokenizer_path: PathBuf::from("./models/all-MiniLM-L6-v2-onnx/tokenizer.json"),
            dimension: 384,
            batch_size: 32,
            intra_threads: 4,
        }
    }
}

/// Retrieval core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub embedder: EmbedderConfig,
    /// Directory holding the single-tenant index artifacts
    pub index_dir: PathBuf,
    /// Persist the single-tenant index after every mutation
    pub persist: bool,
    /// Prefix content-type markers and append key terms before embedding
    pub annotate_content: bool,
    /// Idle time after which a session is garbage-collected
    pub session_ttl_secs: u64,
    /// Results returned when the caller does not pass k
    pub default_top_k: usize,
    /// Minimum cosine similarity for returned results
    pub similarity_threshold: f32,
    /// Token budget for assembled context
    pub context_max_tokens: usize,
    /// Candidates considered when assembling context
    pub context_top_k: usize,
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            index_dir: PathBuf::from("vector_index"),
            persist: true,
            annotate_content: true,
            session_ttl_secs: 2 * 60 * 60,
            default_top_k: 5,
            similarity_threshold: 0.0,
            context_max_tokens: 3000,
            context_top_k: 10,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl RetrievalConfig {
    /// Load configuration from environment variables, defaulting anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let embedder_defaults = EmbedderConfig::default();

        Self {
            embedder: EmbedderConfig {
                backend: env_parse("EMBEDDING_BACKEND").unwrap_or(embedder_defaults.backend),
                model_name: env::var("EMBEDDING_MODEL_NAME")
                    .unwrap_or(embedder_defaults.model_name),
                model_path: env::var("EMBEDDING_MODEL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(embedder_defaults.model_path),
                tokenizer_path: env::var("EMBEDDING_TOKENIZER_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(embedder_defaults.tokenizer_path),
                dimension: env_parse("EMBEDDING_DIMENSION").unwrap_or(embedder_defaults.dimension),
                batch_size: env_parse("EMBEDDING_BATCH_SIZE")
                    .unwrap_or(embedder_defaults.batch_size),
                intra_threads: env_parse("EMBEDDING_INTRA_THREADS")
                    .unwrap_or(embedder_defaults.intra_threads),
            },
            index_dir: env::var("RAG_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            persist: env_flag("RAG_PERSIST").unwrap_or(defaults.persist),
            annotate_content: env_flag("RAG_ANNOTATE_CONTENT").unwrap_or(defaults.annotate_content),
            session_ttl_secs: env_parse("RAG_SESSION_TTL_SECS").unwrap_or(defaults.session_ttl_secs),
            default_top_k: env_parse("RAG_DEFAULT_TOP_K").unwrap_or(defaults.default_top_k),
            similarity_threshold: env_parse("RAG_SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.similarity_threshold),
            context_max_tokens: env_parse("RAG_CONTEXT_MAX_TOKENS")
                .unwrap_or(defaults.context_max_tokens),
            context_top_k: env_parse("RAG_CONTEXT_TOP_K").unwrap_or(defaults.context_top_k),
            chunk_size: env_parse("RAG_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            chunk_overlap: env_parse("RAG_CHUNK_OVERLAP").unwrap_or(defaults.chunk_overlap),
        }
    }

    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            RetrievalError::InvalidConfig(format!(
                "failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Session idle limit as a `Duration`
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RetrievalError::InvalidConfig(msg.to_string()));

        if self.embedder.dimension == 0 {
            return invalid("Embedding dimension must be greater than 0");
        }
        if self.embedder.batch_size == 0 {
            return invalid("Batch size must be greater than 0");
        }
        if self.embedder.backend == EmbedderBackend::Onnx
            && (self.embedder.model_path.as_os_str().is_empty()
                || self.embedder.tokenizer_path.as_os_str().is_empty())
        {
            return invalid("ONNX backend requires model_path and tokenizer_path");
        }
        if self.session_ttl_secs == 0 {
            return invalid("Session TTL must be greater than 0");
        }
        if self.default_top_k == 0 || self.context_top_k == 0 {
            return invalid("Top-k must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return invalid("Similarity threshold must be within [-1, 1]");
        }
        if self.chunk_size == 0 {
            return invalid("Chunk size must be greater than 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            return invalid("Chunk overlap must be smaller than chunk size");
        }
        Ok(())
    }
}
