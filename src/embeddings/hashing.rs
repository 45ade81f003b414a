// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Deterministic feature-hashing embedder
//!
//! Needs no model files: each lower-cased alphanumeric token is hashed with
//! SHA-256 into a signed bucket. Texts sharing words land close together,
//! which is enough for offline use and for exercising the index in tests.

use sha2::{Digest, Sha256};

use super::{l2_normalize, Embedder};
use crate::rag::errors::Result;

/// Same width as all-MiniLM-L6-v2, so indices can switch backends by rebuild only
pub const DEFAULT_HASHING_DIMENSION: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_name: format!("feature-hashing-{}", dimension.max(1)),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }

        if l2_normalize(&mut vector) == 0.0 {
            // no tokens (or all cancelled): fixed unit vector for the empty input
            let (index, sign) = self.bucket("");
            vector.iter_mut().for_each(|v| *v = 0.0);
            vector[index] = sign;
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
