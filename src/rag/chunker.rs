// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recursive character text splitting for ingestion.
//!
//! Text is split on the coarsest separator present (paragraph, line, word,
//! then character), and the pieces are merged back into chunks of at most
//! `chunk_size` characters. Adjacent chunks share up to `chunk_overlap`
//! characters of trailing context.

use serde_json::json;
use std::collections::VecDeque;

use super::passage::{Passage, PassageMetadata};

/// Separators tried in order; "" splits into single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split text into trimmed, non-empty chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    /// Split text and wrap each chunk as a passage of `source`.
    ///
    /// Each passage carries `chunk_id`, plus `total_chunks` and `chunk_size`
    /// (characters) as caller fields.
    pub fn chunk_passages(&self, text: &str, source: &str) -> Vec<Passage> {
        self.chunk_passages_from(text, source, 0)
    }

    /// Like `chunk_passages`, numbering chunks from `first_chunk_id`.
    ///
    /// `total_chunks` still counts the chunks of this text only.
    pub fn chunk_passages_from(&self, text: &str, source: &str, first_chunk_id: u64) -> Vec<Passage> {
        let chunks = self.split(text);
        let total = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let metadata = PassageMetadata::new(source)
                    .with_chunk_id(first_chunk_id + i as u64)
                    .with_field("total_chunks", json!(total))
                    .with_field("chunk_size", json!(content.chars().count()));
                Passage { content, metadata }
            })
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, candidate) in separators.iter().copied().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks.retain(|c| !c.is_empty());
        chunks
    }

    /// Greedily packs pieces into chunks, carrying a tail of at most
    /// `chunk_overlap` characters into the next chunk.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current, separator);

                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    let front_joiner = if current.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(char_len(front) + front_joiner);
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
