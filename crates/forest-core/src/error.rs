//! Crate-level error type
//!
//! Each layer has its own error enum (`StorageError`, `EmbeddingError`);
//! this is the surface the public operations return. The scoring kernel is
//! pure and never raises.

use crate::embeddings::EmbeddingError;
use crate::storage::StorageError;

/// Error surfaced by the public Forest operations
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Referenced id does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Progressive prefix matched more than one id
    #[error("ambiguous reference '{prefix}' ({} matches)", matches.len())]
    Ambiguous {
        /// The prefix or reference that was resolved
        prefix: String,
        /// All matching ids, ordered by updated_at descending then id ascending
        matches: Vec<String>,
    },

    /// Malformed input (bad editor buffer, unknown strategy, bad tag, ...)
    #[error("validation: {0}")]
    Validation(String),

    /// Storage failure (transient failures are retried once before surfacing)
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Embedding gateway failure that could not be degraded away
    #[error("embedding: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Invariant violation; the current batch has been rolled back
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Result alias for public operations
pub type Result<T> = std::result::Result<T, ForestError>;

impl ForestError {
    /// True when the error is a retryable storage failure
    pub fn is_transient(&self) -> bool {
        matches!(self, ForestError::Storage(StorageError::Transient(_)))
    }
}
