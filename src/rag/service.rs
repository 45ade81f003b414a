// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval entry points used by the ingestion and question-answering layers
//!
//! A `RetrievalService` owns one persistent single-tenant index and a
//! `SessionManager`. Every operation takes an optional session token:
//! `None` addresses the single-tenant index, `Some(token)` a session.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::errors::Result;
use super::passage::{Passage, RawPassage, SearchResult, StoredPassage};
use super::session_manager::{SessionManager, SessionSummary};
use super::vector_index::{IndexOptions, IndexStats, LoadOutcome, VectorIndex};
use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;

/// Result of an ingest call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Passages stored (empty contents are skipped)
    pub accepted_count: usize,
}

pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    index: RwLock<VectorIndex>,
    sessions: SessionManager,
    load_outcome: LoadOutcome,
    default_top_k: usize,
    context_max_tokens: usize,
}

impl RetrievalService {
    /// Build the service from configuration with an already-loaded embedder
    pub fn new(config: &RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;

        let options = IndexOptions {
            annotate_content: config.annotate_content,
            persist_dir: config.persist.then(|| config.index_dir.clone()),
            context_top_k: config.context_top_k,
            similarity_threshold: config.similarity_threshold,
        };

        let (index, load_outcome) = VectorIndex::open(embedder.clone(), options.clone());
        let sessions = SessionManager::new(embedder.clone(), options, config.session_ttl());

        info!(
            "Retrieval service ready: model={}, {}D, {} passages",
            embedder.model_name(),
            embedder.dimension(),
            index.len()
        );

        Ok(Self {
            embedder,
            index: RwLock::new(index),
            sessions,
            load_outcome,
            default_top_k: config.default_top_k,
            context_max_tokens: config.context_max_tokens,
        })
    }

    /// What was found on disk when the single-tenant index was opened
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn context_max_tokens(&self) -> usize {
        self.context_max_tokens
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn to_passages(source_id: &str, passages: Vec<RawPassage>) -> Vec<Passage> {
        passages
            .into_iter()
            .enumerate()
            .map(|(position, raw)| Passage::from_raw(source_id, position, raw))
            .collect()
    }

    /// Ingest passages of one source into the single-tenant index
    pub fn ingest(&self, source_id: &str, passages: Vec<RawPassage>) -> Result<IngestReport> {
        let passages = Self::to_passages(source_id, passages);
        let accepted_count = self
            .index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(passages)?;
        Ok(IngestReport { accepted_count })
    }

    /// Ingest passages of one source into a session
    pub fn ingest_session(
        &self,
        token: &str,
        source_id: &str,
        passages: Vec<RawPassage>,
    ) -> Result<IngestReport> {
        let session = self.sessions.get_session(token)?;
        let accepted_count = session.add(Self::to_passages(source_id, passages))?;
        Ok(IngestReport { accepted_count })
    }

    /// Ingest already-built passages (e.g. from the chunker), keeping their metadata
    pub fn ingest_passages(&self, token: Option<&str>, passages: Vec<Passage>) -> Result<IngestReport> {
        let accepted_count = match token {
            None => self
                .index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .add(passages)?,
            Some(token) => self.sessions.get_session(token)?.add(passages)?,
        };
        Ok(IngestReport { accepted_count })
    }

    pub fn query(
        &self,
        token: Option<&str>,
        text: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        match token {
            None => self
                .index
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .search(text, k, threshold),
            Some(token) => self.sessions.get_session(token)?.search(text, k, threshold),
        }
    }

    /// Returns the number of passages removed
    pub fn remove_source(&self, token: Option<&str>, source_id: &str) -> Result<usize> {
        match token {
            None => self
                .index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .delete_by_source(source_id),
            Some(token) => self.sessions.get_session(token)?.delete_by_source(source_id),
        }
    }

    pub fn stats(&self, token: Option<&str>) -> Result<IndexStats> {
        match token {
            None => Ok(self
                .index
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .stats()),
            Some(token) => self.sessions.session_stats(token),
        }
    }

    pub fn relevant_context(
        &self,
        token: Option<&str>,
        query: &str,
        max_tokens: usize,
    ) -> Result<String> {
        match token {
            None => self
                .index
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .relevant_context(query, max_tokens),
            Some(token) => self
                .sessions
                .get_session(token)?
                .relevant_context(query, max_tokens),
        }
    }

    pub fn passages(&self, token: Option<&str>) -> Result<Vec<StoredPassage>> {
        match token {
            None => Ok(self
                .index
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .passages()),
            Some(token) => self.sessions.get_session(token)?.passages(),
        }
    }

    /// Empty an index. For a session this keeps the session alive.
    pub fn clear(&self, token: Option<&str>) -> Result<()> {
        match token {
            None => self
                .index
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear(),
            Some(token) => self.sessions.get_session(token)?.clear_index(),
        }
    }

    pub fn create_session(&self) -> String {
        self.sessions.create_session()
    }

    /// Destroy a session. Returns false if the token was unknown.
    pub fn end_session(&self, token: &str) -> bool {
        self.sessions.clear_session(token)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list_sessions()
    }
}
