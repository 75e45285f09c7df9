//! Node store ("RepoService")
//!
//! Create and navigate nodes, read and write scoped string properties, and
//! store, retrieve, and delete binary files with checksum metadata and
//! optional per-file encryption, all on top of the narrow
//! [`ContentRepository`] interface.
//!
//! # Design Principles
//!
//! - Size limits are checked strictly before any persistence I/O
//! - Checksums are computed over plaintext, never ciphertext
//! - Retrieval never raises for data absence or bad credentials; it returns a
//!   [`Retrieval`] outcome, and the distinct causes are only visible in logs
//! - A file write commits binary plus metadata together or not at all

pub mod checksum;
pub mod errors;
mod file;
mod size;

pub use checksum::{compute_checksum, parse_checksum};
pub use errors::{StoreError, StoreResult};
pub use file::{FileObject, FileRecord};
pub use size::SizeChecker;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::archive::{self, ArchiveError, EncryptionMode};
use crate::repo::{path, ContentRepository, NodeId};

use file::{parse_record_key, record_key};

/// Outcome of a file retrieval.
///
/// Data absence and credential failures are deliberately not errors: bulk
/// callers (restore, mass retrieval, integrity checks) proceed past
/// individual misses. The causes are logged distinctly but surfaced
/// uniformly.
#[derive(Debug)]
pub enum Retrieval {
    /// Content reproduced byte-for-byte
    Found(Vec<u8>),
    /// Unknown parent node, rel path, file id, or file name
    NotFound,
    /// Encrypted content and the password was wrong or missing
    WrongCredential,
    /// Stored data is damaged (missing binary, bad metadata, failed decode)
    Corrupt(String),
}

impl Retrieval {
    pub fn is_found(&self) -> bool {
        matches!(self, Retrieval::Found(_))
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            Retrieval::Found(content) => Some(content),
            _ => None,
        }
    }

    pub fn into_content(self) -> Option<Vec<u8>> {
        match self {
            Retrieval::Found(content) => Some(content),
            _ => None,
        }
    }
}

enum Resolved {
    Record(FileRecord),
    Missing,
    Corrupt(String),
}

/// The node/property/file store over a repository session.
///
/// Single-writer: one session per store, writes must be serialized by the
/// caller. [`shutdown`](NodeStore::shutdown) releases the session exactly
/// once; operations after shutdown fail with a session-closed error.
pub struct NodeStore<R: ContentRepository> {
    repo: R,
    user: Option<String>,
}

impl<R: ContentRepository> NodeStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo, user: None }
    }

    /// Attribute subsequent writes to a user name.
    pub fn with_user(repo: R, user: &str) -> Self {
        Self {
            repo,
            user: Some(user.to_string()),
        }
    }

    /// Create the `rel_path` chain under `parent` and return the resulting
    /// node path.
    ///
    /// With a parent given, the parent must already exist; missing
    /// intermediate segments of `rel_path` are created beneath it. With no
    /// parent, the chain is created from the root. Idempotent.
    pub fn ensure_node(&mut self, parent: Option<&str>, rel_path: &str) -> StoreResult<String> {
        let full = match parent {
            Some(parent) => {
                let parent = path::normalize(parent);
                if self.repo.lookup(&parent)?.is_none() {
                    return Err(StoreError::ParentNotFound(parent));
                }
                path::join(&parent, rel_path)
            }
            None => path::normalize(rel_path),
        };
        self.repo.ensure_path(&full)?;
        self.repo.save()?;
        Ok(full)
    }

    /// Write a scoped string property. Last write wins. The node must exist.
    ///
    /// Keys starting with the `file:` prefix are reserved for file metadata
    /// records and rejected; accepting them would let a user property shadow
    /// a record or vanish from backups.
    pub fn store_property(
        &mut self,
        node_path: &str,
        rel_path: &str,
        key: &str,
        value: &str,
    ) -> StoreResult<()> {
        if key.starts_with(file::RECORD_KEY_PREFIX) {
            return Err(StoreError::ReservedKey(key.to_string()));
        }
        let node = self.require_node(node_path)?;
        self.repo.set_property(node, rel_path, key, value)?;
        self.repo.save()?;
        Ok(())
    }

    /// Read a scoped string property; `None` when the node, rel path, or key
    /// is unknown.
    pub fn retrieve_property(
        &self,
        node_path: &str,
        rel_path: &str,
        key: &str,
    ) -> StoreResult<Option<String>> {
        match self.repo.lookup(node_path)? {
            Some(node) => Ok(self.repo.property(node, rel_path, key)?),
            None => Ok(None),
        }
    }

    /// Persist a file under its addressing triple.
    ///
    /// The size check runs before any I/O; the checksum is computed over
    /// plaintext; with a password the content is sealed (AES-256) before it
    /// is persisted. A fresh file id is assigned on every call, so storing
    /// twice under the same triple yields two retrievable entries.
    pub fn store_file(
        &mut self,
        file: &mut FileObject,
        checker: &SizeChecker,
        password: Option<&str>,
    ) -> StoreResult<()> {
        let content = file.content.take().ok_or(StoreError::NoContent)?;
        let result = self.store_file_inner(file, &content, checker, password);
        file.content = Some(content);
        result
    }

    fn store_file_inner(
        &mut self,
        file: &mut FileObject,
        content: &[u8],
        checker: &SizeChecker,
        password: Option<&str>,
    ) -> StoreResult<()> {
        checker.check(content.len() as u64)?;

        let parent = path::normalize(&file.parent_path);
        let node = self
            .repo
            .lookup(&parent)?
            .ok_or_else(|| StoreError::ParentNotFound(parent.clone()))?;

        let checksum = compute_checksum(content);
        let sealed;
        let stored: &[u8] = match password {
            Some(pw) => {
                sealed = archive::seal_encrypted(content, pw, EncryptionMode::Aes256)?;
                &sealed
            }
            None => content,
        };

        let file_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let record = FileRecord {
            file_id,
            file_name: file.file_name.clone(),
            description: file.description.clone(),
            size: content.len() as u64,
            checksum: checksum.clone(),
            encrypted: password.is_some(),
            created_at: now,
            created_by: self.user.clone(),
            updated_at: now,
            updated_by: self.user.clone(),
        };

        self.repo
            .set_binary(node, &file.rel_path, &file_id.to_string(), stored)?;
        if let Err(e) = self.repo.set_property(
            node,
            &file.rel_path,
            &record_key(&file_id),
            &record.to_json()?,
        ) {
            // keep binary and metadata committed together or not at all
            let _ = self
                .repo
                .delete_binary(node, &file.rel_path, &file_id.to_string());
            return Err(e.into());
        }
        self.repo.save()?;

        file.apply_record(&record);
        debug!(
            parent = %parent,
            rel_path = %file.rel_path,
            file_id = %file_id,
            size = content.len(),
            encrypted = password.is_some(),
            "stored file"
        );
        Ok(())
    }

    /// Look up a file by id (id wins when both id and name are given) or by
    /// name, and reproduce its plaintext content.
    ///
    /// On [`Retrieval::Found`] the file object's metadata fields are filled
    /// from the stored record. All miss causes are logged distinctly.
    pub fn retrieve_file(
        &self,
        file: &mut FileObject,
        password: Option<&str>,
    ) -> StoreResult<Retrieval> {
        let parent = path::normalize(&file.parent_path);
        let node = match self.repo.lookup(&parent)? {
            Some(node) => node,
            None => {
                debug!(parent = %parent, "retrieve miss: parent node unknown");
                return Ok(Retrieval::NotFound);
            }
        };

        let record = match self.resolve(node, file)? {
            Resolved::Record(record) => record,
            Resolved::Missing => return Ok(Retrieval::NotFound),
            Resolved::Corrupt(reason) => {
                warn!(parent = %parent, rel_path = %file.rel_path, %reason, "retrieve hit damaged metadata");
                return Ok(Retrieval::Corrupt(reason));
            }
        };

        let stored = match self
            .repo
            .binary(node, &file.rel_path, &record.file_id.to_string())?
        {
            Some(stored) => stored,
            None => {
                warn!(file_id = %record.file_id, "metadata present but stored content missing");
                return Ok(Retrieval::Corrupt("stored content missing".into()));
            }
        };

        let plaintext = if record.encrypted {
            let password = match password {
                Some(pw) => pw,
                None => {
                    debug!(file_id = %record.file_id, "retrieve miss: password missing for encrypted file");
                    return Ok(Retrieval::WrongCredential);
                }
            };
            match archive::open_envelope(&stored, Some(password)) {
                Ok(plaintext) => plaintext,
                Err(ArchiveError::WrongPassword) => {
                    debug!(file_id = %record.file_id, "retrieve miss: wrong password");
                    return Ok(Retrieval::WrongCredential);
                }
                Err(e) => {
                    warn!(file_id = %record.file_id, error = %e, "encrypted content failed to decode");
                    return Ok(Retrieval::Corrupt(e.to_string()));
                }
            }
        } else {
            stored
        };

        if record.encrypted {
            // decrypt-and-verify round trip against the plaintext checksum
            let recomputed = compute_checksum(&plaintext);
            if recomputed != record.checksum || plaintext.len() as u64 != record.size {
                warn!(file_id = %record.file_id, "decrypted content does not match stored checksum");
                return Ok(Retrieval::Corrupt("checksum mismatch after decrypt".into()));
            }
        }

        file.apply_record(&record);
        Ok(Retrieval::Found(plaintext))
    }

    /// Delete a file addressed by id or name. Returns whether it existed.
    pub fn delete_file(&mut self, file: &FileObject) -> StoreResult<bool> {
        let parent = path::normalize(&file.parent_path);
        let node = match self.repo.lookup(&parent)? {
            Some(node) => node,
            None => return Ok(false),
        };
        let file_id = match (self.resolve(node, file)?, file.file_id) {
            (Resolved::Record(record), _) => record.file_id,
            // damaged metadata still deletable when addressed by id
            (Resolved::Corrupt(_), Some(id)) => id,
            _ => return Ok(false),
        };

        self.repo
            .remove_property(node, &file.rel_path, &record_key(&file_id))?;
        self.repo
            .delete_binary(node, &file.rel_path, &file_id.to_string())?;
        self.repo.save()?;
        debug!(parent = %parent, file_id = %file_id, "deleted file");
        Ok(true)
    }

    /// Release the underlying repository session. Exactly once; later calls
    /// fail with a session-closed error.
    pub fn shutdown(&mut self) -> StoreResult<()> {
        self.repo.save()?;
        self.repo.close()?;
        Ok(())
    }

    fn require_node(&self, node_path: &str) -> StoreResult<NodeId> {
        let normalized = path::normalize(node_path);
        self.repo
            .lookup(&normalized)?
            .ok_or(StoreError::NodeNotFound(normalized))
    }

    fn resolve(&self, node: NodeId, file: &FileObject) -> StoreResult<Resolved> {
        let rel = &file.rel_path;
        if let Some(file_id) = file.file_id {
            // id wins over name
            return match self.repo.property(node, rel, &record_key(&file_id))? {
                Some(json) => match FileRecord::from_json(&json) {
                    Ok(record) => Ok(Resolved::Record(record)),
                    Err(e) => Ok(Resolved::Corrupt(e.to_string())),
                },
                None => {
                    debug!(%file_id, rel_path = %rel, "retrieve miss: file id unknown");
                    Ok(Resolved::Missing)
                }
            };
        }

        let properties = self.repo.properties(node, rel)?;
        if properties.is_empty() && self.repo.binary_names(node, rel)?.is_empty() {
            debug!(rel_path = %rel, "retrieve miss: rel path unknown");
            return Ok(Resolved::Missing);
        }

        // several entries may share one name; take the most recently updated
        let mut best: Option<FileRecord> = None;
        for (key, json) in properties {
            if parse_record_key(&key).is_none() {
                continue;
            }
            let record = match FileRecord::from_json(&json) {
                Ok(record) => record,
                Err(e) => {
                    warn!(%key, error = %e, "skipping unparsable file record");
                    continue;
                }
            };
            if record.file_name == file.file_name
                && best.as_ref().map_or(true, |b| record.updated_at > b.updated_at)
            {
                best = Some(record);
            }
        }
        match best {
            Some(record) => Ok(Resolved::Record(record)),
            None => {
                debug!(file_name = %file.file_name, rel_path = %rel, "retrieve miss: file name unknown");
                Ok(Resolved::Missing)
            }
        }
    }

    /// Read access to the underlying repository session.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // Internal surface for the integrity checker and backup orchestrator.

    /// File records in one namespace plus the keys that failed to parse.
    pub(crate) fn file_records(
        &self,
        node: NodeId,
        ns: &str,
    ) -> StoreResult<(Vec<FileRecord>, Vec<String>)> {
        let mut records = Vec::new();
        let mut damaged = Vec::new();
        for (key, json) in self.repo.properties(node, ns)? {
            if parse_record_key(&key).is_none() {
                continue;
            }
            match FileRecord::from_json(&json) {
                Ok(record) => records.push(record),
                Err(_) => damaged.push(key),
            }
        }
        Ok((records, damaged))
    }

    /// Properties in one namespace that are not file records.
    pub(crate) fn data_properties(
        &self,
        node: NodeId,
        ns: &str,
    ) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .repo
            .properties(node, ns)?
            .into_iter()
            .filter(|(key, _)| !key.starts_with(file::RECORD_KEY_PREFIX))
            .collect())
    }

    /// Raw stored bytes of a file: plaintext when unencrypted, the sealed
    /// envelope otherwise.
    pub(crate) fn raw_binary(
        &self,
        node: NodeId,
        ns: &str,
        file_id: &Uuid,
    ) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.repo.binary(node, ns, &file_id.to_string())?)
    }

    /// Write a property without flushing; restore batches many writes and
    /// flushes once at the end.
    pub(crate) fn restore_property(
        &mut self,
        node_path: &str,
        rel_path: &str,
        key: &str,
        value: &str,
    ) -> StoreResult<()> {
        let node = self.require_node(node_path)?;
        self.repo.set_property(node, rel_path, key, value)?;
        Ok(())
    }

    /// Re-create a file entry verbatim, preserving id, checksum, and
    /// timestamps. Restore-only.
    pub(crate) fn restore_file_record(
        &mut self,
        node_path: &str,
        rel_path: &str,
        record: &FileRecord,
        stored: &[u8],
    ) -> StoreResult<()> {
        let node = self.require_node(node_path)?;
        self.repo
            .set_binary(node, rel_path, &record.file_id.to_string(), stored)?;
        self.repo
            .set_property(node, rel_path, &record_key(&record.file_id), &record.to_json()?)?;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> StoreResult<()> {
        self.repo.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::LocalRepository;
    use tempfile::TempDir;

    fn open_store() -> (NodeStore<LocalRepository>, TempDir) {
        let temp = TempDir::new().unwrap();
        let repo = LocalRepository::init(temp.path()).unwrap();
        (NodeStore::with_user(repo, "tester"), temp)
    }

    #[test]
    fn test_ensure_node_idempotent() {
        let (mut store, _temp) = open_store();
        let a = store.ensure_node(None, "world/europe").unwrap();
        let b = store.ensure_node(None, "world/europe").unwrap();
        assert_eq!(a, "/world/europe");
        assert_eq!(a, b);
    }

    #[test]
    fn test_ensure_node_missing_parent_fails() {
        let (mut store, _temp) = open_store();
        let result = store.ensure_node(Some("/world/europe"), "germany");
        assert!(matches!(result, Err(StoreError::ParentNotFound(_))));
    }

    #[test]
    fn test_ensure_node_under_existing_parent() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();
        let path = store.ensure_node(Some("/world"), "europe/germany").unwrap();
        assert_eq!(path, "/world/europe/germany");
    }

    #[test]
    fn test_property_roundtrip_and_last_write_wins() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world/europe").unwrap();
        store
            .store_property("/world/europe", "germany", "capital", "Bonn")
            .unwrap();
        store
            .store_property("/world/europe", "germany", "capital", "Berlin")
            .unwrap();

        let value = store
            .retrieve_property("/world/europe", "germany", "capital")
            .unwrap();
        assert_eq!(value.as_deref(), Some("Berlin"));

        assert!(store
            .retrieve_property("/world/europe", "germany", "anthem")
            .unwrap()
            .is_none());
        assert!(store
            .retrieve_property("/nowhere", "germany", "capital")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_store_property_missing_node_fails() {
        let (mut store, _temp) = open_store();
        let result = store.store_property("/nowhere", "ns", "k", "v");
        assert!(matches!(result, Err(StoreError::NodeNotFound(_))));
    }

    #[test]
    fn test_store_property_reserved_prefix_rejected() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();

        let result = store.store_property("/world", "ns", "file:notes", "x");
        assert!(matches!(result, Err(StoreError::ReservedKey(_))));
        assert!(store
            .retrieve_property("/world", "ns", "file:notes")
            .unwrap()
            .is_none());

        // only the exact prefix is reserved
        store.store_property("/world", "ns", "filename", "logo.png").unwrap();
    }

    #[test]
    fn test_store_and_retrieve_file() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world/europe").unwrap();

        let content = b"png bytes".to_vec();
        let mut file =
            FileObject::new("/world/europe", "germany", "logo.png").with_content(content.clone());
        store
            .store_file(&mut file, &SizeChecker::new(10_000), None)
            .unwrap();

        assert!(file.file_id.is_some());
        assert_eq!(file.size, content.len() as u64);
        assert_eq!(file.checksum.as_deref(), Some(compute_checksum(&content).as_str()));

        let mut lookup = FileObject::new("/world/europe", "germany", "logo.png");
        let outcome = store.retrieve_file(&mut lookup, None).unwrap();
        assert_eq!(outcome.content(), Some(content.as_slice()));
        assert_eq!(lookup.file_id, file.file_id);
        assert_eq!(lookup.created_by.as_deref(), Some("tester"));
    }

    #[test]
    fn test_size_limit_enforced_before_io() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();

        let content = vec![0u8; 150];
        let mut file = FileObject::new("/world", "ns", "big.bin").with_content(content.clone());
        let result = store.store_file(&mut file, &SizeChecker::new(100), None);
        assert!(matches!(
            result,
            Err(StoreError::MaxFileSizeExceeded { limit: 100, actual: 150 })
        ));
        // rejection left nothing behind
        let mut lookup = FileObject::new("/world", "ns", "big.bin");
        assert!(!store.retrieve_file(&mut lookup, None).unwrap().is_found());

        let mut file = FileObject::new("/world", "ns", "big.bin").with_content(content);
        store.store_file(&mut file, &SizeChecker::new(10_000), None).unwrap();
    }

    #[test]
    fn test_retrieve_misses_return_not_found() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world/europe").unwrap();
        let mut file = FileObject::new("/world/europe", "germany", "logo.png")
            .with_content(b"x".to_vec());
        store.store_file(&mut file, &SizeChecker::new(100), None).unwrap();

        // unknown parent node
        let mut miss = FileObject::new("/world/asia", "germany", "logo.png");
        assert!(!store.retrieve_file(&mut miss, None).unwrap().is_found());
        // unknown rel path
        let mut miss = FileObject::new("/world/europe", "france", "logo.png");
        assert!(!store.retrieve_file(&mut miss, None).unwrap().is_found());
        // unknown file name
        let mut miss = FileObject::new("/world/europe", "germany", "other.png");
        assert!(!store.retrieve_file(&mut miss, None).unwrap().is_found());
        // unknown file id
        let mut miss = FileObject::by_id("/world/europe", "germany", Uuid::new_v4());
        assert!(!store.retrieve_file(&mut miss, None).unwrap().is_found());
    }

    #[test]
    fn test_encrypted_roundtrip_and_wrong_password() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "vault").unwrap();

        let content = b"classified attachment".to_vec();
        let mut file = FileObject::new("/vault", "ns", "secret.bin").with_content(content.clone());
        store
            .store_file(&mut file, &SizeChecker::new(10_000), Some("hunter2"))
            .unwrap();
        assert!(file.encrypted);
        // checksum is over plaintext even for encrypted entries
        assert_eq!(file.checksum.as_deref(), Some(compute_checksum(&content).as_str()));

        let mut lookup = FileObject::new("/vault", "ns", "secret.bin");
        let outcome = store.retrieve_file(&mut lookup, Some("hunter2")).unwrap();
        assert_eq!(outcome.content(), Some(content.as_slice()));

        let mut lookup = FileObject::new("/vault", "ns", "secret.bin");
        assert!(matches!(
            store.retrieve_file(&mut lookup, Some("wrong")).unwrap(),
            Retrieval::WrongCredential
        ));
        let mut lookup = FileObject::new("/vault", "ns", "secret.bin");
        assert!(matches!(
            store.retrieve_file(&mut lookup, None).unwrap(),
            Retrieval::WrongCredential
        ));
    }

    #[test]
    fn test_restore_same_name_keeps_old_entry_by_id() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();

        let mut first = FileObject::new("/world", "ns", "report.pdf").with_content(b"v1".to_vec());
        store.store_file(&mut first, &SizeChecker::new(100), None).unwrap();
        let first_id = first.file_id.unwrap();

        let mut second = FileObject::new("/world", "ns", "report.pdf").with_content(b"v2".to_vec());
        store.store_file(&mut second, &SizeChecker::new(100), None).unwrap();
        assert_ne!(first_id, second.file_id.unwrap());

        // name resolves to the newest entry; the old one stays reachable by id
        let mut by_name = FileObject::new("/world", "ns", "report.pdf");
        assert_eq!(
            store.retrieve_file(&mut by_name, None).unwrap().content(),
            Some(b"v2".as_slice())
        );
        let mut by_id = FileObject::by_id("/world", "ns", first_id);
        assert_eq!(
            store.retrieve_file(&mut by_id, None).unwrap().content(),
            Some(b"v1".as_slice())
        );
    }

    #[test]
    fn test_id_wins_over_unrelated_name() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();
        let mut file = FileObject::new("/world", "ns", "logo.png").with_content(b"abc".to_vec());
        store.store_file(&mut file, &SizeChecker::new(100), None).unwrap();

        let mut lookup = FileObject::new("/world", "ns", "completely-unrelated.txt");
        lookup.file_id = file.file_id;
        let outcome = store.retrieve_file(&mut lookup, None).unwrap();
        assert_eq!(outcome.content(), Some(b"abc".as_slice()));
        assert_eq!(lookup.file_name, "logo.png");
    }

    #[test]
    fn test_delete_file() {
        let (mut store, _temp) = open_store();
        store.ensure_node(None, "world").unwrap();
        let mut file = FileObject::new("/world", "ns", "gone.bin").with_content(b"x".to_vec());
        store.store_file(&mut file, &SizeChecker::new(100), None).unwrap();

        assert!(store.delete_file(&file).unwrap());
        let mut lookup = FileObject::new("/world", "ns", "gone.bin");
        assert!(!store.retrieve_file(&mut lookup, None).unwrap().is_found());
        assert!(!store.delete_file(&file).unwrap());
    }

    #[test]
    fn test_shutdown_is_exactly_once() {
        let (mut store, _temp) = open_store();
        store.shutdown().unwrap();
        assert!(store.ensure_node(None, "x").is_err());
        assert!(store.shutdown().is_err());
    }
}
