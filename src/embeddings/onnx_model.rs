// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Embedding Model Wrapper
//!
//! Wraps ONNX Runtime to run the all-MiniLM-L6-v2 sentence transformer.
//!
//! Features:
//! - ONNX model loading from disk
//! - GPU acceleration via CUDA when built with the `cuda` feature (CPU fallback)
//! - BERT tokenization with truncation and per-batch padding
//! - Attention-masked mean pooling followed by L2 normalisation
//! - 384-dimensional output vectors

use anyhow::Context;
use ndarray::{Array2, ArrayView2, Axis};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::{debug, info, warn};

use super::{l2_normalize, Embedder};
use crate::rag::errors::{Result, RetrievalError};

/// Output width of all-MiniLM-L6-v2
const MODEL_DIMENSION: usize = 384;

/// Longest token sequence fed to the model
const MAX_SEQUENCE_LENGTH: usize = 256;

/// ONNX-based embedding model (all-MiniLM-L6-v2)
///
/// The session is behind a `Mutex` because ONNX Runtime needs exclusive
/// access per run; the struct itself is cheap to clone and share.
#[derive(Clone)]
pub struct OnnxEmbeddingModel {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Loads the model and tokenizer from disk and validates the output shape
    ///
    /// # Errors
    /// Returns `ModelUnavailable` if:
    /// - Model or tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails
    /// - Model doesn't output `[batch, seq_len, 384]`
    ///
    /// # Example
    /// ```ignore
    /// let model = OnnxEmbeddingModel::new(
    ///     "all-MiniLM-L6-v2",
    ///     "./models/all-MiniLM-L6-v2-onnx/model.onnx",
    ///     "./models/all-MiniLM-L6-v2-onnx/tokenizer.json",
    ///     32,
    ///     4,
    /// )?;
    /// ```
    pub fn new<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
        batch_size: usize,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let unavailable = |reason: String| RetrievalError::ModelUnavailable {
            model: model_name.clone(),
            reason,
        };

        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();
        if !model_path.exists() {
            return Err(unavailable(format!(
                "ONNX model file not found: {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(unavailable(format!(
                "Tokenizer file not found: {}",
                tokenizer_path.display()
            )));
        }

        let mut session = build_session(model_path, intra_threads.max(1))
            .map_err(|e| unavailable(format!("{:#}", e)))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| unavailable(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| unavailable(format!("Failed to configure truncation: {}", e)))?;

        // Validation run: the model must emit token-level [batch, seq_len, 384] output
        {
            let encoding = tokenizer
                .encode("validation test", true)
                .map_err(|e| unavailable(format!("Tokenizer validation failed: {}", e)))?;
            let pooled = run_inference(&mut session, &[encoding])
                .map_err(|e| unavailable(format!("{:#}", e)))?;
            let dimension = pooled.first().map(Vec::len).unwrap_or(0);
            if dimension != MODEL_DIMENSION {
                return Err(unavailable(format!(
                    "Model outputs {}D embeddings (expected {}D)",
                    dimension, MODEL_DIMENSION
                )));
            }
        }

        info!("✅ ONNX embedding model '{}' loaded", model_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: MODEL_DIMENSION,
            batch_size: batch_size.max(1),
        })
    }

    /// Counts tokens (including special tokens, after truncation)
    pub fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RetrievalError::Embedding(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.get_attention_mask().iter().map(|&m| m as usize).sum())
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| RetrievalError::Embedding(format!("Tokenization failed: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| RetrievalError::Embedding("ONNX session lock poisoned".to_string()))?;
        let mut embeddings = run_inference(&mut session, &encodings)
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;

        for (i, embedding) in embeddings.iter_mut().enumerate() {
            if embedding.len() != self.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            if l2_normalize(embedding) == 0.0 {
                warn!("Embedding {} in batch has zero magnitude", i);
            }
        }
        Ok(embeddings)
    }
}

impl Embedder for OnnxEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!(
            "Embedding {} texts in batches of {}",
            texts.len(),
            self.batch_size
        );
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_chunk(chunk)?);
        }
        Ok(embeddings)
    }
}

/// Creates an ONNX Runtime session, trying CUDA first when compiled in
fn build_session(model_path: &Path, intra_threads: usize) -> anyhow::Result<Session> {
    #[cfg(feature = "cuda")]
    {
        info!("   Attempting CUDA execution provider...");
        let cuda_result = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path);

        match cuda_result {
            Ok(session) => {
                info!("✅ CUDA execution provider initialized");
                return Ok(session);
            }
            Err(e) => {
                warn!("⚠️  CUDA execution provider failed: {}", e);
                warn!("   Falling back to CPU execution provider");
            }
        }
    }

    Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))
}

/// Runs one padded batch through the model and mean-pools each row
fn run_inference(session: &mut Session, encodings: &[Encoding]) -> anyhow::Result<Vec<Vec<f32>>> {
    let batch = encodings.len();
    let max_len = encodings
        .iter()
        .map(|enc| enc.get_ids().len())
        .max()
        .unwrap_or(0);

    let mut input_ids = Vec::with_capacity(batch * max_len);
    let mut attention_mask = Vec::with_capacity(batch * max_len);
    for encoding in encodings {
        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let padding = max_len - ids.len();

        input_ids.extend(ids.iter().map(|&id| id as i64));
        input_ids.extend(std::iter::repeat(0i64).take(padding));
        attention_mask.extend(mask.iter().map(|&m| m as i64));
        attention_mask.extend(std::iter::repeat(0i64).take(padding));
    }
    let token_type_ids = vec![0i64; batch * max_len];

    let mask_array = Array2::from_shape_vec((batch, max_len), attention_mask)
        .context("Failed to create attention_mask array")?;
    let input_ids_array = Array2::from_shape_vec((batch, max_len), input_ids)
        .context("Failed to create input_ids array")?;
    let token_type_ids_array = Array2::from_shape_vec((batch, max_len), token_type_ids)
        .context("Failed to create token_type_ids array")?;

    let outputs = session.run(ort::inputs![
        "input_ids" => Value::from_array(input_ids_array)?,
        "attention_mask" => Value::from_array(mask_array.clone())?,
        "token_type_ids" => Value::from_array(token_type_ids_array)?
    ])?;

    // Index [0] rather than a name: exports differ in their output naming
    let output = outputs[0]
        .try_extract_array::<f32>()
        .context("Failed to extract output tensor")?;
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != batch {
        anyhow::bail!(
            "Model outputs unexpected dimensions: {:?} (expected [batch, seq_len, hidden])",
            shape
        );
    }

    let mut pooled = Vec::with_capacity(batch);
    for row in 0..batch {
        let tokens = output
            .index_axis(Axis(0), row)
            .into_dimensionality::<ndarray::Ix2>()
            .context("Failed to view token embeddings")?;
        pooled.push(mean_pool(tokens, &mask_array.row(row).to_vec()));
    }
    Ok(pooled)
}

/// Averages token embeddings, ignoring padding positions
fn mean_pool(tokens: ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let hidden = tokens.shape()[1];
    let mut pooled = vec![0.0f32; hidden];
    let mut sum_mask = 0.0f32;

    for (i, token) in tokens.outer_iter().enumerate() {
        let weight = mask.get(i).copied().unwrap_or(0) as f32;
        if weight == 0.0 {
            continue;
        }
        sum_mask += weight;
        for (acc, value) in pooled.iter_mut().zip(token.iter()) {
            *acc += value * weight;
        }
    }

    for value in &mut pooled {
        *value /= sum_mask.max(1e-9);
    }
    pooled
}
