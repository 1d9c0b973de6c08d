//! Error types for the BandSync engine.

use crate::{CollectionName, RecordId};
use thiserror::Error;

/// All possible errors from the BandSync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("unknown field '{field}' in collection {collection}")]
    UnknownField {
        collection: CollectionName,
        field: String,
    },

    // Conversion errors
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid document {id}: {reason}")]
    InvalidDocument { id: RecordId, reason: String },

    // Cache errors
    #[error("invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    #[error("cache scope mismatch: expected {expected}, got {actual}")]
    ScopeMismatch { expected: String, actual: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
