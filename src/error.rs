//! Error types for the reindexing engine.

use crate::types::{RowId, VerseKey};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`RowStore`](crate::rows::RowStore) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowStoreError {
    #[error("Row not found: {0}")]
    NotFound(RowId),

    #[error("Row store unavailable: {0}")]
    Unavailable(String),

    #[error("Row store conflict: {0}")]
    Conflict(String),
}

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid anvaya number: {0:?}")]
    InvalidAnvaya(String),

    #[error("Duplicate anvaya number {anvaya_no} in sentence {sentno}")]
    DuplicateIndex { sentno: String, anvaya_no: String },

    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    /// A row store call failed part way through a multi-row write.
    /// `confirmed` lists the rows that were written before the failure.
    #[error("Persistence failed after {} confirmed writes: {source}", .confirmed.len())]
    Persistence {
        confirmed: Vec<RowId>,
        source: RowStoreError,
    },

    #[error("Undo entry for {verse} expired ({age:?} old)")]
    UndoExpired { verse: VerseKey, age: Duration },

    #[error("Nothing to undo for {0}")]
    NothingToUndo(VerseKey),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid ledger format: {0}")]
    InvalidFormat(String),

    #[error("Ledger is locked by another process")]
    Locked,
}

impl EngineError {
    /// Persistence failure with nothing confirmed.
    pub fn store(source: RowStoreError) -> Self {
        EngineError::Persistence {
            confirmed: Vec::new(),
            source,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EngineError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for EngineError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        EngineError::Deserialization(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
