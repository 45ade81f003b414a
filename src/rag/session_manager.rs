// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Session-scoped vector indices for multi-tenant use
// Each session owns an in-memory index that is dropped on clear or after the idle TTL

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{Result, RetrievalError};
use super::passage::{Passage, SearchResult, StoredPassage};
use super::vector_index::{IndexOptions, IndexStats, VectorIndex};
use crate::embeddings::Embedder;

/// Default idle time before a session is discarded (2 hours)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Session lifecycle: Active until cleared or expired, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Expired,
    Cleared,
}

#[derive(Debug)]
struct SessionClock {
    last_accessed: DateTime<Utc>,
    state: SessionState,
}

/// Prefix of a token that is safe to log
fn short(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// One tenant's isolated index
#[derive(Debug)]
pub struct Session {
    token: String,
    created_at: DateTime<Utc>,
    clock: Mutex<SessionClock>,
    index: RwLock<VectorIndex>,
}

impl Session {
    fn new(token: String, index: VectorIndex) -> Self {
        let now = Utc::now();
        Self {
            token,
            created_at: now,
            clock: Mutex::new(SessionClock {
                last_accessed: now,
                state: SessionState::Active,
            }),
            index: RwLock::new(index),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.clock().last_accessed
    }

    pub fn state(&self) -> SessionState {
        self.clock().state
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, SessionClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, VectorIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, VectorIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refreshes `last_accessed`, failing if the session has ended
    fn touch(&self) -> Result<()> {
        let mut clock = self.clock();
        if clock.state != SessionState::Active {
            return Err(RetrievalError::SessionNotFound(self.token.clone()));
        }
        clock.last_accessed = Utc::now();
        Ok(())
    }

    fn is_idle_longer_than(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let last = self.clock().last_accessed;
        (now - last)
            .to_std()
            .map(|idle| idle > ttl)
            .unwrap_or(false)
    }

    /// Moves to a terminal state and frees the index
    fn end(&self, state: SessionState) {
        self.clock().state = state;
        let mut index = self.write_index();
        // in-memory indices have no artifacts to remove
        let _ = index.clear();
    }

    /// Adds passages, tagging each with this session's token and the time of insertion
    pub fn add(&self, mut passages: Vec<Passage>) -> Result<usize> {
        self.touch()?;
        let now = Utc::now();
        for passage in &mut passages {
            passage.metadata.stamp_session(&self.token, now);
        }
        let added = self.write_index().add(passages)?;
        debug!("Session {}: added {} passages", short(&self.token), added);
        Ok(added)
    }

    pub fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        self.touch()?;
        self.read_index().search(query, k, threshold)
    }

    pub fn delete_by_source(&self, source: &str) -> Result<usize> {
        self.touch()?;
        self.write_index().delete_by_source(source)
    }

    pub fn relevant_context(&self, query: &str, max_tokens: usize) -> Result<String> {
        self.touch()?;
        self.read_index().relevant_context(query, max_tokens)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.touch()?;
        Ok(self.read_index().stats())
    }

    pub fn passages(&self) -> Result<Vec<StoredPassage>> {
        self.touch()?;
        Ok(self.read_index().passages())
    }

    /// Empties the session's index without ending the session
    pub fn clear_index(&self) -> Result<()> {
        self.touch()?;
        self.write_index().clear()
    }

    fn summary(&self) -> SessionSummary {
        let stats = self.read_index().stats();
        let clock = self.clock();
        SessionSummary {
            token: self.token.clone(),
            created_at: self.created_at,
            last_accessed: clock.last_accessed,
            state: clock.state,
            total_passages: stats.total_passages,
            total_sources: stats.total_sources,
        }
    }
}

/// Listing entry for an active session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub state: SessionState,
    pub total_passages: usize,
    pub total_sources: usize,
}

/// Registry of live sessions
///
/// Expired sessions are swept whenever a new session is created, and dropped
/// lazily if looked up after their TTL. There is no background timer.
pub struct SessionManager {
    embedder: Arc<dyn Embedder>,
    options: IndexOptions,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(embedder: Arc<dyn Embedder>, options: IndexOptions, ttl: Duration) -> Self {
        Self {
            embedder,
            options,
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate an empty session and return its token
    pub fn create_session(&self) -> String {
        let swept = self.sweep_expired();
        if swept > 0 {
            info!("Swept {} expired sessions", swept);
        }

        let token = Uuid::new_v4().to_string();
        let index = VectorIndex::in_memory(self.embedder.clone(), self.options.clone());
        let session = Arc::new(Session::new(token.clone(), index));

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), session);

        info!("Created session {}", short(&token));
        token
    }

    /// Look up a session and refresh its access time.
    ///
    /// Unknown, cleared and expired tokens all yield `SessionNotFound`.
    pub fn get_session(&self, token: &str) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or_else(|| RetrievalError::SessionNotFound(token.to_string()))?;

        if session.is_idle_longer_than(self.ttl, Utc::now()) {
            self.sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(token);
            session.end(SessionState::Expired);
            info!("Session {} expired", short(token));
            return Err(RetrievalError::SessionNotFound(token.to_string()));
        }

        session.touch()?;
        Ok(session)
    }

    /// Destroy a session. Returns false if the token was unknown.
    pub fn clear_session(&self, token: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);

        match removed {
            Some(session) => {
                session.end(SessionState::Cleared);
                info!("Cleared session {}", short(token));
                true
            }
            None => false,
        }
    }

    /// Drop every session idle for longer than the TTL, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let tokens: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_idle_longer_than(self.ttl, now))
                .map(|(t, _)| t.clone())
                .collect();
            tokens.iter().filter_map(|t| sessions.remove(t)).collect()
        };

        for session in &expired {
            session.end(SessionState::Expired);
            debug!("Session {} expired", short(session.token()));
        }
        expired.len()
    }

    /// Summaries of all live sessions, without refreshing their access times
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| !s.is_idle_longer_than(self.ttl, now))
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub fn session_stats(&self, token: &str) -> Result<IndexStats> {
        self.get_session(token)?.stats()
    }

    /// Number of sessions held, including expired ones not yet swept
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
