// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Sentence embedding backends
//!
//! Every backend turns text into fixed-length, L2-normalised vectors so that
//! inner product equals cosine similarity. Backends are stateless per call and
//! shared across indices as `Arc<dyn Embedder>`.

pub mod hashing;
pub mod onnx_model;

pub use hashing::HashingEmbedder;
pub use onnx_model::OnnxEmbeddingModel;

use std::sync::Arc;
use tracing::info;

use crate::config::{EmbedderBackend, EmbedderConfig};
use crate::rag::errors::{Result, RetrievalError};

/// Text to vector mapping backed by a pretrained (or synthetic) model
pub trait Embedder: Send + Sync {
    /// Model identifier, persisted alongside vectors
    fn model_name(&self) -> &str;

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts, returning one normalised vector per input in input order
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text. An empty string is valid input.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_many(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("backend returned no vector".to_string()))
    }
}

/// Scales `vector` to unit length in place, returning the original magnitude.
///
/// A zero vector is left untouched and 0.0 is returned.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    norm
}

/// Builds the embedder selected by `config`
pub fn load_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend {
        EmbedderBackend::Onnx => {
            let model = OnnxEmbeddingModel::new(
                config.model_name.clone(),
                &config.model_path,
                &config.tokenizer_path,
                config.batch_size,
                config.intra_threads,
            )?;
            if model.dimension() != config.dimension {
                return Err(RetrievalError::ModelUnavailable {
                    model: config.model_name.clone(),
                    reason: format!(
                        "model outputs {}D vectors, configuration expects {}D",
                        model.dimension(),
                        config.dimension
                    ),
                });
            }
            Ok(Arc::new(model))
        }
        EmbedderBackend::Hashing => {
            info!(
                "Using hashing embedder ({} dimensions, no model weights)",
                config.dimension
            );
            Ok(Arc::new(HashingEmbedder::new(config.dimension)))
        }
    }
}
