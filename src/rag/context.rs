// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Assembles ranked search results into a single prompt context string

use super::passage::SearchResult;

pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Token-budgeted context assembly
///
/// Tokens are estimated from character counts; no tokenizer is involved.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    pub max_tokens: usize,
    pub chars_per_token: usize,
    /// A truncated final block is only emitted if more than this many characters fit
    pub min_partial_chars: usize,
}

impl ContextBuilder {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            chars_per_token: 4,
            min_partial_chars: 100,
        }
    }

    /// Joins `Source: <source>\n<content>` blocks in ranking order until the
    /// budget runs out. Returns an empty string when nothing fits.
    pub fn build(&self, results: &[SearchResult]) -> String {
        let chars_per_token = self.chars_per_token.max(1);
        let mut blocks = Vec::new();
        let mut used_tokens = 0usize;

        for result in results {
            let content_chars = result.content.chars().count();
            let tokens = content_chars / chars_per_token;

            if used_tokens + tokens > self.max_tokens {
                let remaining_chars = (self.max_tokens - used_tokens) * chars_per_token;
                if remaining_chars > self.min_partial_chars {
                    let partial: String = result.content.chars().take(remaining_chars).collect();
                    blocks.push(format!(
                        "Source: {}\n{}...",
                        result.metadata.source(),
                        partial
                    ));
                }
                break;
            }

            blocks.push(format!(
                "Source: {}\n{}",
                result.metadata.source(),
                result.content
            ));
            used_tokens += tokens;
        }

        blocks.join(BLOCK_SEPARATOR)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(3000)
    }
}
