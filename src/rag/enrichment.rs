// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content enrichment applied to passages at insertion time
//!
//! Everything here is derived from passage text alone, so the same content
//! always produces the same annotations and metadata.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use super::passage::Passage;

const MAX_KEY_PHRASES: usize = 15;
const MAX_LONG_WORDS: usize = 5;
const MAX_ANNOTATED_TERMS: usize = 10;
const COMMON_WORDS: [&str; 8] = [
    "system",
    "process",
    "example",
    "definition",
    "important",
    "different",
    "various",
    "general",
];

/// Heuristic category of a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Definition,
    Example,
    Process,
    Question,
    List,
    #[default]
    General,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Definition => "definition",
            ContentType::Example => "example",
            ContentType::Process => "process",
            ContentType::Question => "question",
            ContentType::List => "list",
            ContentType::General => "general",
        }
    }

    /// Marker prefixed to annotated content, if this type has one
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            ContentType::Definition => Some("[DEFINITION]"),
            ContentType::Example => Some("[EXAMPLE]"),
            ContentType::Process => Some("[PROCESS]"),
            _ => None,
        }
    }

    /// Classifies text; earlier categories win when several match
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if has_any(&["definition", "define", "is defined as"]) {
            ContentType::Definition
        } else if has_any(&["example", "for instance", "such as"]) {
            ContentType::Example
        } else if has_any(&["process", "procedure", "steps"]) {
            ContentType::Process
        } else if text.contains('?') {
            ContentType::Question
        } else if list_pattern().is_match(text) {
            ContentType::List
        } else {
            ContentType::General
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.|•|\*").expect("list pattern is valid"))
}

/// Bulleted or numbered item followed by whitespace
fn list_item_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\s|•\s|\*\s").expect("list item pattern is valid"))
}

fn capitalised_phrase_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").expect("phrase pattern is valid")
    })
}

fn technical_term_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[a-z]+(?:_[a-z]+)+\b|\b[a-z]+[A-Z][a-z]+\b").expect("term pattern is valid")
    })
}

fn long_word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z]{6,}\b").expect("word pattern is valid"))
}

/// Extracts searchable key phrases: capitalised multi-word terms, snake_case or
/// camelCase identifiers, then up to five long uncommon words.
///
/// Output is deduplicated in first-seen order.
pub fn extract_key_phrases(text: &str) -> Vec<String> {
    let mut candidates: Vec<&str> = Vec::new();
    candidates.extend(capitalised_phrase_pattern().find_iter(text).map(|m| m.as_str()));
    candidates.extend(technical_term_pattern().find_iter(text).map(|m| m.as_str()));
    candidates.extend(
        long_word_pattern()
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|w| !COMMON_WORDS.contains(&w.to_lowercase().as_str()))
            .take(MAX_LONG_WORDS),
    );

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(str::trim)
        .filter(|p| p.chars().count() > 3)
        .filter(|p| seen.insert(*p))
        .take(MAX_KEY_PHRASES)
        .map(str::to_string)
        .collect()
}

/// Derived facts about a piece of text
///
/// The `has_*` flags are independent of `content_type`: a passage classified
/// as a definition can still contain an example.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentProfile {
    pub word_count: usize,
    pub sentence_count: usize,
    pub content_type: ContentType,
    pub key_phrases: Vec<String>,
    pub has_definition: bool,
    pub has_example: bool,
    pub has_process: bool,
    pub has_list: bool,
    /// Words per character
    pub content_density: f32,
}

impl ContentProfile {
    pub fn of(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
        let word_count = text.split_whitespace().count();

        Self {
            word_count,
            sentence_count: text.split('.').filter(|s| !s.trim().is_empty()).count(),
            content_type: ContentType::classify(text),
            key_phrases: extract_key_phrases(text),
            has_definition: has_any(&["define", "definition"]),
            has_example: has_any(&["example", "for instance"]),
            has_process: has_any(&["process", "steps"]),
            has_list: list_item_pattern().is_match(text),
            content_density: word_count as f32 / text.chars().count().max(1) as f32,
        }
    }
}

/// Rewrites content for embedding: type marker in front, key terms appended
pub fn annotate(text: &str, profile: &ContentProfile) -> String {
    let mut annotated = match profile.content_type.marker() {
        Some(marker) => format!("{} {}", marker, text),
        None => text.to_string(),
    };

    if !profile.key_phrases.is_empty() {
        let terms: Vec<&str> = profile
            .key_phrases
            .iter()
            .take(MAX_ANNOTATED_TERMS)
            .map(String::as_str)
            .collect();
        annotated.push_str("\n[KEY_TERMS] ");
        annotated.push_str(&terms.join(", "));
    }
    annotated
}

/// Fills the derived metadata fields from the passage's current content.
///
/// Returns the profile so callers can annotate without re-deriving it.
pub fn enrich(passage: &mut Passage) -> ContentProfile {
    let profile = ContentProfile::of(&passage.content);
    passage.metadata.apply_profile(&profile);
    profile
}
