// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the retrieval core
//!
//! Covers every failure the embedder, index, persistence layer and session
//! manager can surface:
//! - Model errors (weights/tokenizer missing, inference failure)
//! - Session errors (unknown, cleared or expired token)
//! - Persistence errors (corrupt or inconsistent artifacts, I/O)
//! - Validation errors (dimension mismatch, non-finite vectors, bad config)

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the retrieval core
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding model could not be loaded (missing weights, bad tokenizer, wrong shape)
    #[error("Embedding model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Model was loaded but inference failed for a given input
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Session token is unknown, cleared or expired
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Persisted index artifacts exist but cannot be used
    #[error("Persisted index at {path} is corrupted: {reason}")]
    PersistenceCorrupted { path: PathBuf, reason: String },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}D, got {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector contains NaN/Infinity or has zero magnitude
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encoding or decoding of persisted data failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> Self {
        RetrievalError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for RetrievalError {
    fn from(err: bincode::Error) -> Self {
        RetrievalError::Serialization(err.to_string())
    }
}

impl RetrievalError {
    /// Get user-friendly error message for the outer layer
    pub fn user_message(&self) -> String {
        match self {
            RetrievalError::ModelUnavailable { model, .. } => {
                format!("The embedding model '{}' is not available", model)
            }
            RetrievalError::SessionNotFound(_) => {
                "Your session has expired - please start a new one".to_string()
            }
            RetrievalError::PersistenceCorrupted { .. } => {
                "Stored documents could not be read and were reset".to_string()
            }
            RetrievalError::DimensionMismatch { expected, actual } => {
                format!(
                    "Index integrity error: expected {}D vectors, found {}D",
                    expected, actual
                )
            }
            _ => self.to_string(),
        }
    }

    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RetrievalError::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            RetrievalError::Embedding(_) => "EMBEDDING_FAILED",
            RetrievalError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            RetrievalError::PersistenceCorrupted { .. } => "PERSISTENCE_CORRUPTED",
            RetrievalError::Io(_) => "IO_ERROR",
            RetrievalError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            RetrievalError::InvalidVector(_) => "INVALID_VECTOR",
            RetrievalError::InvalidConfig(_) => "INVALID_CONFIG",
            RetrievalError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Caller can continue after handling this error (re-create session, start empty)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RetrievalError::SessionNotFound(_) | RetrievalError::PersistenceCorrupted { .. }
        )
    }

    /// No embedding operation can proceed
    pub fn is_fatal(&self) -> bool {
        matches!(self, RetrievalError::ModelUnavailable { .. })
    }
}
