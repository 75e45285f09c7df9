//! Backup archive manifests
//!
//! Every backup archive opens with an [`ArchiveManifest`] entry describing
//! the archive itself, followed by one [`NodeManifest`] entry per node. Node
//! manifests carry the node's non-file properties and the metadata records of
//! its files; the file content itself lives in separate blob entries keyed by
//! the entry names recorded here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{BackupError, BackupResult};
use crate::store::FileRecord;

/// Layout version written into new archives
pub const FORMAT_VERSION: u32 = 1;

/// Leading entry of every backup archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
}

impl ArchiveManifest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            format_version: FORMAT_VERSION,
        }
    }

    pub fn to_json(&self) -> BackupResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            BackupError::InvalidArchive(format!("failed to serialize archive manifest: {}", e))
        })
    }

    pub fn from_json(json: &str) -> BackupResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            BackupError::InvalidArchive(format!("failed to parse archive manifest: {}", e))
        })
    }
}

/// One archived file: where it goes, where its content entry lives, and its
/// preserved metadata record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub rel_path: String,
    pub entry_name: String,
    pub record: FileRecord,
}

/// One archived node: path, non-file properties by namespace, file entries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeManifest {
    pub path: String,
    pub properties: BTreeMap<String, BTreeMap<String, String>>,
    pub files: Vec<FileEntry>,
}

impl NodeManifest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            properties: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    pub fn to_json(&self) -> BackupResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            BackupError::InvalidArchive(format!("failed to serialize node manifest: {}", e))
        })
    }

    pub fn from_json(json: &str) -> BackupResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            BackupError::InvalidArchive(format!("failed to parse node manifest: {}", e))
        })
    }
}
