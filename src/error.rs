//! Error types at the engine's seams.

use thiserror::Error;

/// Failures reported by a shared-item or message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another record already owns this canonical key. Recoverable: the
    /// caller re-reads and treats the share as a repeat.
    #[error("shared item already exists for canonical key: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Failures of a chat request as seen by the HTTP and CLI layers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any side effect (empty text, empty upload).
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("blob storage error: {0}")]
    Blob(#[from] std::io::Error),
}
