//! # Backup Errors

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::repo::RepoError;
use crate::store::StoreError;

/// Result type for backup and restore operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors raised by the backup orchestrator
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Restore confirmation token mismatch")]
    ConfirmationMismatch,

    #[error("Invalid backup archive: {0}")]
    InvalidArchive(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
