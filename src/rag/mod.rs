// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Retrieval core: passage storage, similarity search and session-scoped indices

pub mod chunker;
pub mod context;
pub mod enrichment;
pub mod errors;
pub mod passage;
pub mod persistence;
pub mod service;
pub mod session_manager;
pub mod vector_index;

pub use chunker::TextChunker;
pub use context::ContextBuilder;
pub use enrichment::{extract_key_phrases, ContentProfile, ContentType};
pub use errors::{Result, RetrievalError};
pub use passage::{Passage, PassageMetadata, RawPassage, SearchResult, StoredPassage};
pub use persistence::{IndexSnapshot, IndexStore};
pub use service::{IngestReport, RetrievalService};
pub use session_manager::{
    Session, SessionManager, SessionState, SessionSummary, DEFAULT_SESSION_TTL,
};
pub use vector_index::{IndexOptions, IndexStats, LoadOutcome, VectorIndex};
