// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod rag;

// Re-export main types
pub use config::{EmbedderBackend, EmbedderConfig, RetrievalConfig};
pub use embeddings::{load_embedder, Embedder, HashingEmbedder, OnnxEmbeddingModel};
pub use rag::{
    IndexOptions, IngestReport, Passage, PassageMetadata, RawPassage, RetrievalError,
    RetrievalService, SearchResult, SessionManager, VectorIndex,
};
