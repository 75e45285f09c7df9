//! # Repository Errors

use thiserror::Error;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors raised by the hierarchical content repository
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepoError {
    /// Wrap an I/O error with path context
    pub fn io_at(path: &std::path::Path, source: std::io::Error) -> Self {
        RepoError::Io(format!("{}: {}", path.display(), source))
    }
}
