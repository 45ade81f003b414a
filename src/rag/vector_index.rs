// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Exact cosine-similarity index over embedded passages
// Vectors, contents and metadata are kept in lockstep by ordinal position

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::ContextBuilder;
use super::enrichment::{annotate, enrich};
use super::errors::{Result, RetrievalError};
use super::passage::{Passage, PassageMetadata, SearchResult, StoredPassage};
use super::persistence::{IndexSnapshot, IndexStore};
use crate::embeddings::{l2_normalize, Embedder};

/// Norm drift tolerated before a vector is re-normalised
const NORM_TOLERANCE: f32 = 1e-4;

/// Behaviour switches for a `VectorIndex`
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Prefix content-type markers and append key terms before embedding
    pub annotate_content: bool,
    /// Directory for persisted artifacts; `None` keeps the index in memory only
    pub persist_dir: Option<PathBuf>,
    /// Candidates considered by `relevant_context`
    pub context_top_k: usize,
    /// Threshold applied by `relevant_context`
    pub similarity_threshold: f32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            annotate_content: true,
            persist_dir: None,
            context_top_k: 10,
            similarity_threshold: 0.0,
        }
    }
}

/// What `VectorIndex::open` found on disk
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing usable was persisted
    Fresh,
    /// Persisted passages restored
    Loaded(usize),
    /// Persisted state was unusable and the index started empty
    Recovered(String),
}

/// Summary of index contents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_passages: usize,
    pub total_sources: usize,
    pub sources: BTreeMap<String, usize>,
    pub content_types: BTreeMap<String, usize>,
    pub embedding_dimension: usize,
    pub model_name: String,
}

/// Parallel storage. `append` and `truncate` are the only in-place mutators,
/// so the three columns can never drift apart.
#[derive(Debug, Default)]
struct Columns {
    dimension: usize,
    vectors: Vec<f32>,
    contents: Vec<String>,
    metadata: Vec<PassageMetadata>,
}

impl Columns {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.contents.len()
    }

    fn vector(&self, ordinal: usize) -> &[f32] {
        let start = ordinal * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn append(&mut self, vector: &[f32], content: String, metadata: PassageMetadata) {
        self.vectors.extend_from_slice(vector);
        self.contents.push(content);
        self.metadata.push(metadata);
        self.check_lengths();
    }

    /// Drops every row from `len` onwards
    fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len * self.dimension);
        self.contents.truncate(len);
        self.metadata.truncate(len);
        self.check_lengths();
    }

    /// Copy of the rows whose metadata passes `keep`, reusing their vectors
    fn retained(&self, keep: impl Fn(&PassageMetadata) -> bool) -> Columns {
        let mut rebuilt = Columns::new(self.dimension);
        for (ordinal, (content, meta)) in self.contents.iter().zip(&self.metadata).enumerate() {
            if keep(meta) {
                rebuilt.append(self.vector(ordinal), content.clone(), meta.clone());
            }
        }
        rebuilt
    }

    fn clear(&mut self) {
        *self = Columns::new(self.dimension);
    }

    fn check_lengths(&self) {
        debug_assert_eq!(self.contents.len(), self.metadata.len());
        debug_assert_eq!(self.vectors.len(), self.contents.len() * self.dimension);
    }
}

/// Validates length and finiteness, re-normalising if the norm has drifted
fn prepare_vector(mut vector: Vec<f32>, dimension: usize) -> Result<Vec<f32>> {
    if vector.len() != dimension {
        return Err(RetrievalError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RetrievalError::InvalidVector(
            "contains NaN or Infinity".to_string(),
        ));
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Err(RetrievalError::InvalidVector("zero magnitude".to_string()));
    }
    if (norm - 1.0).abs() > NORM_TOLERANCE {
        l2_normalize(&mut vector);
    }
    Ok(vector)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Flat inner-product index over unit vectors
///
/// Not synchronised: wrap in a lock when shared between threads.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    options: IndexOptions,
    store: Option<IndexStore>,
    columns: Columns,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model_name", &self.embedder.model_name())
            .field("dimension", &self.columns.dimension)
            .field("len", &self.columns.len())
            .field("persist_dir", &self.options.persist_dir)
            .finish()
    }
}

impl VectorIndex {
    /// Create an index that never touches disk, whatever `options.persist_dir` says
    pub fn in_memory(embedder: Arc<dyn Embedder>, mut options: IndexOptions) -> Self {
        options.persist_dir = None;
        let dimension = embedder.dimension();
        Self {
            embedder,
            options,
            store: None,
            columns: Columns::new(dimension),
        }
    }

    /// Create an index, restoring any state persisted under `options.persist_dir`.
    ///
    /// Unreadable or inconsistent artifacts never fail the call: the index
    /// starts empty and the reason is reported as `LoadOutcome::Recovered`.
    pub fn open(embedder: Arc<dyn Embedder>, options: IndexOptions) -> (Self, LoadOutcome) {
        let dimension = embedder.dimension();
        let store = options.persist_dir.clone().map(IndexStore::new);
        let mut index = Self {
            embedder,
            options,
            store,
            columns: Columns::new(dimension),
        };

        let Some(store) = index.store.as_ref() else {
            return (index, LoadOutcome::Fresh);
        };

        let outcome = match store.load() {
            Ok(None) => LoadOutcome::Fresh,
            Ok(Some(snapshot)) => match index.restore(snapshot) {
                Ok(count) => LoadOutcome::Loaded(count),
                Err(e) => LoadOutcome::Recovered(e.to_string()),
            },
            Err(e) => LoadOutcome::Recovered(e.to_string()),
        };

        match &outcome {
            LoadOutcome::Fresh => debug!("No persisted index found, starting empty"),
            LoadOutcome::Loaded(count) => info!("Loaded {} passages from disk", count),
            LoadOutcome::Recovered(reason) => {
                warn!("Discarding persisted index, starting empty: {}", reason)
            }
        }
        (index, outcome)
    }

    fn restore(&mut self, snapshot: IndexSnapshot) -> Result<usize> {
        let path = self
            .options
            .persist_dir
            .clone()
            .unwrap_or_default();
        let corrupted = |reason: String| RetrievalError::PersistenceCorrupted {
            path: path.clone(),
            reason,
        };

        if snapshot.dimension != self.columns.dimension {
            return Err(corrupted(format!(
                "stored {}D vectors, embedder produces {}D",
                snapshot.dimension, self.columns.dimension
            )));
        }
        if snapshot.model_name != self.embedder.model_name() {
            return Err(corrupted(format!(
                "stored vectors from '{}', embedder is '{}'",
                snapshot.model_name,
                self.embedder.model_name()
            )));
        }

        let mut columns = Columns::new(self.columns.dimension);
        let rows = snapshot.vectors.chunks(snapshot.dimension);
        for ((row, content), metadata) in rows.zip(snapshot.contents).zip(snapshot.metadata) {
            let vector = prepare_vector(row.to_vec(), columns.dimension)
                .map_err(|e| corrupted(e.to_string()))?;
            columns.append(&vector, content, metadata);
        }

        let count = columns.len();
        self.columns = columns;
        Ok(count)
    }

    /// Embed and append passages.
    ///
    /// # Arguments
    /// * `passages` - Passages in insertion order; empty contents are skipped
    ///
    /// # Returns
    /// * `Ok(n)` - number of passages stored
    /// * `Err` - embedding failed or a returned vector was unusable; the index is unchanged
    pub fn add(&mut self, passages: Vec<Passage>) -> Result<usize> {
        let mut accepted: Vec<Passage> = passages
            .into_iter()
            .filter(|p| !p.content.is_empty())
            .collect();
        if accepted.is_empty() {
            debug!("No non-empty passages to add");
            return Ok(0);
        }

        let texts: Vec<String> = accepted
            .iter_mut()
            .map(|passage| {
                let profile = enrich(passage);
                if self.options.annotate_content {
                    annotate(&passage.content, &profile)
                } else {
                    passage.content.clone()
                }
            })
            .collect();

        let embeddings = self.embedder.embed_many(&texts)?;
        if embeddings.len() != texts.len() {
            return Err(RetrievalError::Embedding(format!(
                "backend returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        // validate everything before touching the columns
        let vectors = embeddings
            .into_iter()
            .map(|v| prepare_vector(v, self.columns.dimension))
            .collect::<Result<Vec<_>>>()?;

        let before = self.columns.len();
        for ((vector, text), passage) in vectors.iter().zip(texts).zip(accepted) {
            self.columns.append(vector, text, passage.metadata);
        }

        if let Err(e) = self.save() {
            self.columns.truncate(before);
            warn!("Failed to persist new passages, rolled back: {}", e);
            return Err(e);
        }

        info!(
            "Added {} passages (index now holds {})",
            vectors.len(),
            self.columns.len()
        );
        Ok(vectors.len())
    }

    /// Search by query text
    ///
    /// # Arguments
    /// * `query` - Query text (may be empty)
    /// * `k` - Maximum results, clamped to the index size
    /// * `threshold` - Minimum similarity, applied after top-k selection
    pub fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        if self.columns.len() == 0 || k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_one(query)?;
        self.search_by_vector(&query_vector, k, threshold)
    }

    /// Search with a precomputed query vector
    pub fn search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let query = prepare_vector(query.to_vec(), self.columns.dimension)?;
        if self.columns.len() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = (0..self.columns.len())
            .map(|ordinal| (ordinal, dot(&query, self.columns.vector(ordinal))))
            .collect();

        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k.min(self.columns.len()));

        Ok(scored
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(ordinal, score)| SearchResult {
                content: self.columns.contents[ordinal].clone(),
                metadata: self.columns.metadata[ordinal].clone(),
                score: score.clamp(-1.0, 1.0),
            })
            .collect())
    }

    /// Remove every passage whose source matches, returning how many were removed.
    ///
    /// The remaining rows are persisted before they replace the live columns,
    /// so a failed save leaves the index unchanged.
    pub fn delete_by_source(&mut self, source: &str) -> Result<usize> {
        let kept = self.columns.retained(|meta| meta.source() != source);
        let removed = self.columns.len() - kept.len();
        if removed == 0 {
            debug!("No passages found for source '{}'", source);
            return Ok(0);
        }

        self.save_columns(&kept)?;
        self.columns = kept;
        info!(
            "Deleted {} passages from source '{}' ({} remain)",
            removed,
            source,
            self.columns.len()
        );
        Ok(removed)
    }

    /// Empty the index and delete persisted artifacts. Safe to call repeatedly.
    pub fn clear(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            store.remove()?;
        }
        self.columns.clear();
        info!("Cleared vector index");
        Ok(())
    }

    /// Write the current state to disk; a no-op for in-memory indices
    pub fn save(&self) -> Result<()> {
        self.save_columns(&self.columns)
    }

    fn save_columns(&self, columns: &Columns) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&IndexSnapshot {
                model_name: self.embedder.model_name().to_string(),
                dimension: columns.dimension,
                vectors: columns.vectors.clone(),
                contents: columns.contents.clone(),
                metadata: columns.metadata.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Ranked context for a prompt, bounded by `max_tokens`
    pub fn relevant_context(&self, query: &str, max_tokens: usize) -> Result<String> {
        let results = self.search(
            query,
            self.options.context_top_k,
            self.options.similarity_threshold,
        )?;
        Ok(ContextBuilder::new(max_tokens).build(&results))
    }

    pub fn stats(&self) -> IndexStats {
        let mut sources = BTreeMap::new();
        let mut content_types = BTreeMap::new();
        for meta in &self.columns.metadata {
            *sources.entry(meta.source().to_string()).or_insert(0) += 1;
            *content_types
                .entry(meta.content_type().as_str().to_string())
                .or_insert(0) += 1;
        }

        IndexStats {
            total_passages: self.columns.len(),
            total_sources: sources.len(),
            sources,
            content_types,
            embedding_dimension: self.columns.dimension,
            model_name: self.embedder.model_name().to_string(),
        }
    }

    /// Every stored passage in ordinal order
    pub fn passages(&self) -> Vec<StoredPassage> {
        self.columns
            .contents
            .iter()
            .zip(&self.columns.metadata)
            .enumerate()
            .map(|(ordinal, (content, metadata))| StoredPassage {
                ordinal,
                content: content.clone(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Stored vector at `ordinal`
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        (ordinal < self.columns.len()).then(|| self.columns.vector(ordinal))
    }

    pub fn size(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.columns.dimension
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }
}
