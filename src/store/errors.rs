//! # Store Errors
//!
//! Precondition failures (missing parent, oversized content, closed session)
//! raise; data absence and credential failures are not errors here — they are
//! [`Retrieval`](super::Retrieval) outcomes.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::repo::RepoError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the node store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parent node not found: {0}")]
    ParentNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("File too large: {actual} bytes (max: {limit})")]
    MaxFileSizeExceeded { limit: u64, actual: u64 },

    #[error("File object has no content to store")]
    NoContent,

    #[error("Property key '{0}' uses a reserved prefix")]
    ReservedKey(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
