//! # Archive Errors
//!
//! Wrong password, absent entry, and corrupt data are distinct variants so
//! callers that collapse them outwardly (the node store does) can still log
//! the real cause.

use thiserror::Error;

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised by the archive codec
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Wrong or missing password")]
    WrongPassword,

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Corrupt archive data: {0}")]
    Corrupt(String),

    #[error("Encryption failure: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
