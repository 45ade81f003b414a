// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! On-disk layout for a single-tenant index
//!
//! Three artifacts live side by side in the index directory:
//! - `vectors.bin`: bincode-encoded model name, dimension and flat f32 buffer
//! - `passages.json`: passage contents in ordinal order
//! - `metadata.json`: passage metadata in ordinal order
//!
//! Every save stamps the three artifacts with a fresh generation id. All three
//! must be present, carry the same generation and agree on length for a load
//! to succeed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{Result, RetrievalError};
use super::passage::PassageMetadata;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const PASSAGES_FILE: &str = "passages.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Serialize, Deserialize)]
struct VectorsArtifact {
    generation: String,
    model_name: String,
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Serialize)]
struct JsonArtifactRef<'a, T> {
    generation: &'a str,
    entries: &'a [T],
}

#[derive(Deserialize)]
struct JsonArtifact<T> {
    generation: String,
    entries: Vec<T>,
}

/// Everything needed to rebuild an index in memory
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub model_name: String,
    pub dimension: usize,
    /// Flat row-major buffer, `contents.len() * dimension` long
    pub vectors: Vec<f32>,
    pub contents: Vec<String>,
    pub metadata: Vec<PassageMetadata>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// File-backed store for index snapshots
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn artifacts(&self) -> [PathBuf; 3] {
        [
            self.artifact(VECTORS_FILE),
            self.artifact(PASSAGES_FILE),
            self.artifact(METADATA_FILE),
        ]
    }

    /// Write all three artifacts, each atomically, under one generation id.
    ///
    /// A save interrupted between artifacts leaves mixed generations behind,
    /// which `load` rejects.
    pub fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let generation = Uuid::new_v4().to_string();

        let vectors = VectorsArtifact {
            generation: generation.clone(),
            model_name: snapshot.model_name.clone(),
            dimension: snapshot.dimension,
            data: snapshot.vectors.clone(),
        };
        write_atomic(&self.artifact(VECTORS_FILE), &bincode::serialize(&vectors)?)?;
        write_atomic(
            &self.artifact(PASSAGES_FILE),
            serde_json::to_string_pretty(&JsonArtifactRef {
                generation: &generation,
                entries: &snapshot.contents,
            })?
            .as_bytes(),
        )?;
        write_atomic(
            &self.artifact(METADATA_FILE),
            serde_json::to_string_pretty(&JsonArtifactRef {
                generation: &generation,
                entries: &snapshot.metadata,
            })?
            .as_bytes(),
        )?;

        debug!(
            "Saved index snapshot ({} passages) to {}",
            snapshot.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Read a snapshot back.
    ///
    /// # Returns
    /// * `Ok(None)` - no artifacts, or only some of them
    /// * `Ok(Some(snapshot))` - all three present and consistent
    /// * `Err(PersistenceCorrupted)` - present but unreadable or inconsistent
    pub fn load(&self) -> Result<Option<IndexSnapshot>> {
        let present = self.artifacts().iter().filter(|p| p.exists()).count();
        if present == 0 {
            return Ok(None);
        }
        if present < 3 {
            warn!(
                "Index directory {} holds {} of 3 artifacts; treating as empty",
                self.dir.display(),
                present
            );
            return Ok(None);
        }

        let vectors: VectorsArtifact = bincode::deserialize(&fs::read(
            self.artifact(VECTORS_FILE),
        )?)
        .map_err(|e| self.corrupted(format!("{}: {}", VECTORS_FILE, e)))?;
        let contents: JsonArtifact<String> =
            serde_json::from_slice(&fs::read(self.artifact(PASSAGES_FILE))?)
                .map_err(|e| self.corrupted(format!("{}: {}", PASSAGES_FILE, e)))?;
        let metadata: JsonArtifact<PassageMetadata> =
            serde_json::from_slice(&fs::read(self.artifact(METADATA_FILE))?)
                .map_err(|e| self.corrupted(format!("{}: {}", METADATA_FILE, e)))?;

        if contents.generation != vectors.generation || metadata.generation != vectors.generation
        {
            return Err(self.corrupted(format!(
                "artifacts come from different saves ({} / {} / {})",
                vectors.generation, contents.generation, metadata.generation
            )));
        }
        let (contents, metadata) = (contents.entries, metadata.entries);

        if contents.len() != metadata.len() {
            return Err(self.corrupted(format!(
                "{} passages but {} metadata entries",
                contents.len(),
                metadata.len()
            )));
        }
        let expected = contents.len().checked_mul(vectors.dimension);
        if vectors.dimension == 0 || expected != Some(vectors.data.len()) {
            return Err(self.corrupted(format!(
                "vector buffer holds {} floats, expected {} x {}",
                vectors.data.len(),
                contents.len(),
                vectors.dimension
            )));
        }

        Ok(Some(IndexSnapshot {
            model_name: vectors.model_name,
            dimension: vectors.dimension,
            vectors: vectors.data,
            contents,
            metadata,
        }))
    }

    /// Delete all artifacts. Missing files are not an error.
    pub fn remove(&self) -> Result<()> {
        for path in self.artifacts() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        // leave foreign files alone; only drop the directory if it is now empty
        if fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
        {
            let _ = fs::remove_dir(&self.dir);
        }
        Ok(())
    }

    fn corrupted(&self, reason: String) -> RetrievalError {
        RetrievalError::PersistenceCorrupted {
            path: self.dir.clone(),
            reason,
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    // Write atomically using a temp file
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    fs::rename(temp_path, path)?;
    Ok(())
}
