//! Backup and restore
//!
//! Serializes a repository tree into a single archive and restores it back.
//! A backup archive opens with `backup.json`, then one manifest entry per
//! node (depth-first, children in name order) followed by that node's blob
//! entries. Unencrypted content is sealed plain (compressed); encrypted
//! content passes through verbatim, so the archive never needs file
//! passwords.
//!
//! Restore is guarded by a typed confirmation token, compared in constant
//! time, and finishes with a full integrity check of the restored tree.
//!
//! Subtrees whose path contains a registered ignored segment are excluded
//! from backup, and the same filter is re-applied on restore so an archive
//! written under a looser filter cannot smuggle excluded content back in.

pub mod errors;
pub mod manifest;

pub use errors::{BackupError, BackupResult};
pub use manifest::{ArchiveManifest, FileEntry, NodeManifest};

use std::collections::HashMap;
use std::io::{Read, Write};

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::archive::{open_envelope, ArchiveReader, ArchiveWriter};
use crate::integrity::{CheckResult, IntegrityChecker};
use crate::repo::{path, ContentRepository, NodeId};
use crate::store::{FileRecord, NodeStore};

const MANIFEST_ENTRY: &str = "backup.json";

/// Confirmation phrase required to run a destructive restore.
///
/// Restore merges an archive over live repository state, so callers must
/// present a token matching the one the orchestrator was configured with.
#[derive(Debug, Clone)]
pub struct RestoreToken(String);

impl RestoreToken {
    pub fn new(phrase: &str) -> Self {
        Self(phrase.to_string())
    }

    /// Constant-time comparison.
    pub fn matches(&self, presented: &RestoreToken) -> bool {
        let (a, b) = (self.0.as_bytes(), presented.0.as_bytes());
        a.len() == b.len() && bool::from(a.ct_eq(b))
    }
}

impl Default for RestoreToken {
    fn default() -> Self {
        Self::new("RESTORE_OVERWRITES_REPOSITORY")
    }
}

/// Entry counts of one backup run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupReport {
    pub nodes: u64,
    pub files: u64,
}

/// Orchestrates tree backup and token-guarded restore.
pub struct BackupManager {
    ignored_segments: Vec<String>,
    restore_token: RestoreToken,
}

impl BackupManager {
    pub fn new() -> Self {
        Self {
            ignored_segments: Vec::new(),
            restore_token: RestoreToken::default(),
        }
    }

    pub fn with_token(restore_token: RestoreToken) -> Self {
        Self {
            ignored_segments: Vec::new(),
            restore_token,
        }
    }

    /// Exclude every path containing this segment from backup and restore.
    pub fn register_ignored_segment(&mut self, segment: &str) {
        if !self.ignored_segments.iter().any(|s| s == segment) {
            self.ignored_segments.push(segment.to_string());
        }
    }

    pub fn ignored_segments(&self) -> &[String] {
        &self.ignored_segments
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignored_segments
            .iter()
            .any(|segment| path::contains_segment(path, segment))
    }

    /// Serialize the whole repository tree into a named archive written to
    /// `sink`.
    pub fn backup_to_archive<R: ContentRepository, W: Write>(
        &self,
        store: &NodeStore<R>,
        name: &str,
        sink: W,
    ) -> BackupResult<BackupReport> {
        let root = store
            .repo()
            .lookup(path::ROOT)?
            .ok_or_else(|| BackupError::InvalidArchive("repository has no root".into()))?;

        let mut writer = ArchiveWriter::new(sink);
        writer.append_plain(
            MANIFEST_ENTRY,
            ArchiveManifest::new(name).to_json()?.as_bytes(),
        )?;

        let mut report = BackupReport::default();
        self.write_node(store, root, &mut writer, &mut report)?;
        writer.finish()?;

        info!(nodes = report.nodes, files = report.files, "backup archive written");
        Ok(report)
    }

    fn write_node<R: ContentRepository, W: Write>(
        &self,
        store: &NodeStore<R>,
        node: NodeId,
        writer: &mut ArchiveWriter<W>,
        report: &mut BackupReport,
    ) -> BackupResult<()> {
        let node_path = store.repo().path_of(node)?;
        if self.is_ignored(&node_path) {
            info!(path = %node_path, "skipping ignored subtree");
            return Ok(());
        }

        let mut manifest = NodeManifest::new(&node_path);
        let mut blobs = Vec::new();
        for ns in store.repo().namespaces(node)? {
            let scoped = scoped_path(&node_path, &ns);
            if self.is_ignored(&scoped) {
                info!(path = %scoped, "skipping ignored namespace");
                continue;
            }

            let data = store.data_properties(node, &ns)?;
            if !data.is_empty() {
                manifest.properties.insert(ns.clone(), data.into_iter().collect());
            }

            let (records, damaged) = store.file_records(node, &ns)?;
            for key in damaged {
                warn!(path = %scoped, %key, "skipping unparsable file record");
            }
            for record in records {
                let stored = match store.raw_binary(node, &ns, &record.file_id)? {
                    Some(stored) => stored,
                    None => {
                        warn!(path = %scoped, file_id = %record.file_id, "skipping file with missing content");
                        continue;
                    }
                };
                let entry_name = format!("blobs{}/{}", scoped_prefix(&node_path), join_ns(&ns, &record.file_id.to_string()));
                manifest.files.push(FileEntry {
                    rel_path: ns.clone(),
                    entry_name: entry_name.clone(),
                    record: record.clone(),
                });
                blobs.push((entry_name, record.encrypted, stored));
            }
        }

        writer.append_plain(&tree_entry_name(&node_path), manifest.to_json()?.as_bytes())?;
        report.nodes += 1;
        for (entry_name, encrypted, stored) in blobs {
            if encrypted {
                // already a sealed envelope; passes through verbatim
                writer.append_raw(&entry_name, &stored)?;
            } else {
                writer.append_plain(&entry_name, &stored)?;
            }
            report.files += 1;
        }

        for (_, child) in store.repo().children(node)? {
            self.write_node(store, child, writer, report)?;
        }
        Ok(())
    }

    /// Merge an archive back into the repository, then integrity-check the
    /// whole tree.
    ///
    /// The token is verified before the archive is opened; a mismatch leaves
    /// the repository untouched.
    pub fn restore_from_archive<R: ContentRepository, S: Read>(
        &self,
        store: &mut NodeStore<R>,
        token: &RestoreToken,
        source: S,
    ) -> BackupResult<CheckResult> {
        if !self.restore_token.matches(token) {
            return Err(BackupError::ConfirmationMismatch);
        }

        let mut archive_manifest: Option<ArchiveManifest> = None;
        let mut pending: HashMap<String, (String, String, FileRecord)> = HashMap::new();
        let mut restored_files = 0u64;

        ArchiveReader::new(source).for_each(|name, sealed| -> BackupResult<()> {
            // the archive manifest must lead; reject before touching the store
            if archive_manifest.is_none() {
                if name != MANIFEST_ENTRY {
                    return Err(BackupError::InvalidArchive(format!(
                        "expected '{}' as the first entry, found '{}'",
                        MANIFEST_ENTRY, name
                    )));
                }
                archive_manifest = Some(ArchiveManifest::from_json(&decode_text(&sealed)?)?);
                return Ok(());
            }
            if name == MANIFEST_ENTRY {
                warn!(entry = %name, "ignoring duplicate archive manifest entry");
                return Ok(());
            }
            if let Some(node_path) = tree_entry_path(name) {
                let manifest = NodeManifest::from_json(&decode_text(&sealed)?)?;
                if manifest.path != node_path {
                    return Err(BackupError::InvalidArchive(format!(
                        "entry '{}' declares path '{}'",
                        name, manifest.path
                    )));
                }
                if self.is_ignored(&manifest.path) {
                    return Ok(());
                }
                store.ensure_node(None, &manifest.path)?;
                for (ns, props) in &manifest.properties {
                    for (key, value) in props {
                        store.restore_property(&manifest.path, ns, key, value)?;
                    }
                }
                for file in &manifest.files {
                    if self.is_ignored(&scoped_path(&manifest.path, &file.rel_path)) {
                        continue;
                    }
                    pending.insert(
                        file.entry_name.clone(),
                        (manifest.path.clone(), file.rel_path.clone(), file.record.clone()),
                    );
                }
                return Ok(());
            }
            if let Some((node_path, rel_path, record)) = pending.remove(name) {
                let stored = if record.encrypted {
                    // envelope restored verbatim; no password needed
                    sealed
                } else {
                    open_envelope(&sealed, None)?
                };
                store.restore_file_record(&node_path, &rel_path, &record, &stored)?;
                restored_files += 1;
                return Ok(());
            }
            warn!(entry = %name, "ignoring unexpected archive entry");
            Ok(())
        })?;

        if archive_manifest.is_none() {
            // empty archive: nothing was applied
            return Err(BackupError::InvalidArchive(
                "archive manifest entry missing".into(),
            ));
        }
        for (entry, (node_path, rel_path, record)) in &pending {
            warn!(
                %entry,
                path = %scoped_path(node_path, rel_path),
                file_id = %record.file_id,
                "archive lists file but carries no content entry"
            );
        }
        store.flush()?;

        info!(files = restored_files, "restore finished, checking integrity");
        Ok(IntegrityChecker::new().check_tree(store, path::ROOT)?)
    }
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped_prefix(node_path: &str) -> &str {
    if node_path == path::ROOT {
        ""
    } else {
        node_path
    }
}

fn scoped_path(node_path: &str, ns: &str) -> String {
    format!("{}/{}", scoped_prefix(node_path), ns)
}

fn join_ns(ns: &str, name: &str) -> String {
    format!("{}/{}", ns, name)
}

fn tree_entry_name(node_path: &str) -> String {
    if node_path == path::ROOT {
        "tree.json".to_string()
    } else {
        format!("tree{}.json", node_path)
    }
}

fn tree_entry_path(entry_name: &str) -> Option<String> {
    if entry_name == "tree.json" {
        return Some(path::ROOT.to_string());
    }
    entry_name
        .strip_prefix("tree/")
        .and_then(|rest| rest.strip_suffix(".json"))
        .map(|p| format!("/{}", p))
}

fn decode_text(sealed: &[u8]) -> BackupResult<String> {
    let bytes = open_envelope(sealed, None)?;
    String::from_utf8(bytes)
        .map_err(|e| BackupError::InvalidArchive(format!("manifest is not UTF-8: {}", e)))
}
