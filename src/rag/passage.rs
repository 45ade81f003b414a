// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Passage and search result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enrichment::{ContentProfile, ContentType};

/// Metadata attached to every stored passage
///
/// Known fields are typed and reached through accessors; anything else the
/// caller supplied is kept verbatim in `extra` and flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_id: Option<u64>,
    #[serde(default)]
    word_count: usize,
    #[serde(default)]
    sentence_count: usize,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    key_phrases: Vec<String>,
    #[serde(default)]
    has_definition: bool,
    #[serde(default)]
    has_example: bool,
    #[serde(default)]
    has_process: bool,
    #[serde(default)]
    has_list: bool,
    #[serde(default)]
    content_density: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    added_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl PassageMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            chunk_id: None,
            word_count: 0,
            sentence_count: 0,
            content_type: ContentType::General,
            key_phrases: Vec::new(),
            has_definition: false,
            has_example: false,
            has_process: false,
            has_list: false,
            content_density: 0.0,
            session_id: None,
            added_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_chunk_id(mut self, chunk_id: u64) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    /// Adds a caller-defined field. Keys naming a typed field are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !Self::is_reserved(&key) {
            self.extra.insert(key, value);
        }
        self
    }

    fn is_reserved(key: &str) -> bool {
        matches!(
            key,
            "source"
                | "chunk_id"
                | "word_count"
                | "sentence_count"
                | "content_type"
                | "key_phrases"
                | "has_definition"
                | "has_example"
                | "has_process"
                | "has_list"
                | "content_density"
                | "session_id"
                | "added_at"
        )
    }

    /// Origin document identifier
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Position within the source, when known
    pub fn chunk_id(&self) -> Option<u64> {
        self.chunk_id
    }

    /// Whitespace-separated words in the original content (0 until enriched)
    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    /// Heuristic category (`General` until enriched)
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn key_phrases(&self) -> &[String] {
        &self.key_phrases
    }

    pub fn has_definition(&self) -> bool {
        self.has_definition
    }

    pub fn has_example(&self) -> bool {
        self.has_example
    }

    pub fn has_process(&self) -> bool {
        self.has_process
    }

    pub fn has_list(&self) -> bool {
        self.has_list
    }

    /// Words per character (0 until enriched)
    pub fn content_density(&self) -> f32 {
        self.content_density
    }

    /// Session the passage was added under; `None` in the single-tenant index
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// When the passage entered its session
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        self.added_at
    }

    /// Caller-supplied field by key
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn extra_fields(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub(crate) fn apply_profile(&mut self, profile: &ContentProfile) {
        self.word_count = profile.word_count;
        self.sentence_count = profile.sentence_count;
        self.content_type = profile.content_type;
        self.key_phrases = profile.key_phrases.clone();
        self.has_definition = profile.has_definition;
        self.has_example = profile.has_example;
        self.has_process = profile.has_process;
        self.has_list = profile.has_list;
        self.content_density = profile.content_density;
    }

    pub(crate) fn stamp_session(&mut self, session_id: &str, added_at: DateTime<Utc>) {
        self.session_id = Some(session_id.to_string());
        self.added_at = Some(added_at);
    }

    /// Flat JSON view with typed and caller fields side by side
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Unit of searchable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: PassageMetadata::new(source),
        }
    }

    /// Builds a passage from untyped ingest input.
    ///
    /// `source_id` always wins over any `source` key in the caller's map.
    /// `chunk_id` is taken from the map when it is an unsigned integer,
    /// otherwise the passage's position in the ingest batch is used.
    pub fn from_raw(source_id: &str, position: usize, raw: RawPassage) -> Self {
        let chunk_id = raw
            .metadata
            .get("chunk_id")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64);

        let metadata = raw
            .metadata
            .into_iter()
            .fold(
                PassageMetadata::new(source_id).with_chunk_id(chunk_id),
                |meta, (key, value)| meta.with_field(key, value),
            );

        Self {
            content: raw.content,
            metadata,
        }
    }
}

/// Ingest input: content plus free-form metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPassage {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RawPassage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }
}

/// Result from similarity search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: PassageMetadata,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// A passage as held by an index, with its ordinal position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPassage {
    pub ordinal: usize,
    pub content: String,
    pub metadata: PassageMetadata,
}
