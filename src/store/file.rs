//! File value objects
//!
//! [`FileObject`] is the caller-facing description of one stored attachment:
//! the addressing triple (parent node path, rel path, file name), the
//! store-assigned id, content, and metadata. [`FileRecord`] is the metadata
//! subset persisted as a JSON property next to the binary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};

/// Caller-facing description of one stored binary attachment
#[derive(Debug, Clone, Default)]
pub struct FileObject {
    /// Path of the node the file hangs under
    pub parent_path: String,
    /// Secondary namespace under the node
    pub rel_path: String,
    /// Human-chosen file name; not unique across store calls
    pub file_name: String,
    /// Store-assigned id; wins over `file_name` during lookup when set
    pub file_id: Option<Uuid>,
    pub description: Option<String>,
    /// Content bytes; set by the caller for store, untouched by retrieval
    pub content: Option<Vec<u8>>,
    pub size: u64,
    /// `"SHA256: " + hex` over plaintext
    pub checksum: Option<String>,
    pub encrypted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl FileObject {
    /// Address a file by name under (parent, rel path).
    pub fn new(parent_path: &str, rel_path: &str, file_name: &str) -> Self {
        Self {
            parent_path: parent_path.to_string(),
            rel_path: rel_path.to_string(),
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }

    /// Address a file by id under (parent, rel path).
    pub fn by_id(parent_path: &str, rel_path: &str, file_id: Uuid) -> Self {
        Self {
            parent_path: parent_path.to_string(),
            rel_path: rel_path.to_string(),
            file_id: Some(file_id),
            ..Default::default()
        }
    }

    /// Attach content for a subsequent store call.
    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Copy persisted metadata back onto this object.
    pub(crate) fn apply_record(&mut self, record: &FileRecord) {
        self.file_id = Some(record.file_id);
        self.file_name = record.file_name.clone();
        self.description = record.description.clone();
        self.size = record.size;
        self.checksum = Some(record.checksum.clone());
        self.encrypted = record.encrypted;
        self.created_at = Some(record.created_at);
        self.created_by = record.created_by.clone();
        self.updated_at = Some(record.updated_at);
        self.updated_by = record.updated_by.clone();
    }
}

/// Persisted file metadata, stored as a JSON property under the file's
/// rel-path namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub file_name: String,
    pub description: Option<String>,
    /// Plaintext size in bytes
    pub size: u64,
    /// `"SHA256: " + hex` over plaintext
    pub checksum: String,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl FileRecord {
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self)
            .map_err(|e| StoreError::Metadata(format!("failed to serialize file record: {}", e)))
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Metadata(format!("failed to parse file record: {}", e)))
    }
}

/// Prefix reserved for file metadata record keys
pub(crate) const RECORD_KEY_PREFIX: &str = "file:";

/// Property key under which a file's metadata record is stored
pub(crate) fn record_key(file_id: &Uuid) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, file_id)
}

/// Inverse of [`record_key`]
pub(crate) fn parse_record_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(RECORD_KEY_PREFIX)
        .and_then(|s| Uuid::parse_str(s).ok())
}
