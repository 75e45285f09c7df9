//! Deployment configuration
//!
//! A single JSON file covering the storage location, the file size cap, the
//! restore confirmation phrase, and the backup ignore list. Every field has a
//! default, so an empty object is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::{BackupManager, RestoreToken};
use crate::store::SizeChecker;

/// 100 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 104_857_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory of the local repository
    pub storage_dir: PathBuf,
    /// Upper bound on stored file content, in bytes
    pub max_file_size: u64,
    /// Confirmation phrase a restore caller must present
    pub restore_token: String,
    /// Path segments excluded from backup and restore
    pub ignored_segments: Vec<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            restore_token: "RESTORE_OVERWRITES_REPOSITORY".to_string(),
            ignored_segments: Vec::new(),
        }
    }
}

impl VaultConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn size_checker(&self) -> SizeChecker {
        SizeChecker::new(self.max_file_size)
    }

    pub fn backup_manager(&self) -> BackupManager {
        let mut manager = BackupManager::with_token(RestoreToken::new(&self.restore_token));
        for segment in &self.ignored_segments {
            manager.register_ignored_segment(segment);
        }
        manager
    }
}
