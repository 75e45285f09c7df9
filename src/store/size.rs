//! Size-limiting policy
//!
//! Retrieval and decryption load full content into memory, so every write is
//! bounded up front: the check runs strictly before any persistence I/O and a
//! rejection leaves no partial state behind.

use super::errors::{StoreError, StoreResult};

/// Stateless content-length policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChecker {
    max_bytes: u64,
}

impl SizeChecker {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// No limit; for trusted internal writes such as restore.
    pub fn unlimited() -> Self {
        Self { max_bytes: u64::MAX }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate a content length against the configured threshold.
    pub fn check(&self, length: u64) -> StoreResult<()> {
        if length > self.max_bytes {
            return Err(StoreError::MaxFileSizeExceeded {
                limit: self.max_bytes,
                actual: length,
            });
        }
        Ok(())
    }
}
