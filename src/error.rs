//! Crate-wide error types.
//!
//! Each subsystem gets its own `thiserror` enum (storage, embeddings,
//! repository); [`EngineError`] wraps them for callers that cross layer
//! boundaries. Validation failures are returned as data (`{success: false,
//! message}`) rather than as `Err` wherever the façade is involved — see
//! [`crate::facade`].

use crate::decisions::repository::RepositoryError;
use crate::embeddings::EmbeddingError;
use crate::outcome::OutcomeError;
use crate::storage::StorageError;

/// Top-level crate result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can cross a component boundary inside the engine.
///
/// Unrecoverable variants (`Storage`, `Embedding`) are meant to propagate out
/// of the façade per spec — only the context injector swallows every
/// variant and turns it into `None`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The storage adapter failed to open, migrate, or execute a query.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The embedding pipeline failed to initialize or embed text.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// A caller supplied input that fails validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested decision or topic does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Validation(msg) => EngineError::Validation(msg),
            RepositoryError::Storage(e) => EngineError::Storage(e),
            RepositoryError::Embedding(e) => EngineError::Embedding(e),
        }
    }
}

impl From<OutcomeError> for EngineError {
    fn from(e: OutcomeError) -> Self {
        match e {
            OutcomeError::Validation(msg) => EngineError::Validation(msg),
            OutcomeError::NotFound(id) => EngineError::NotFound(id),
            OutcomeError::Storage(e) => EngineError::Storage(e),
        }
    }
}
