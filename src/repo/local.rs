//! Local reference repository
//!
//! Arena node tree in memory, binaries on the local filesystem under
//! `<root>/blobs/<node id>/<namespace>/<name>`. Binary writes go through a
//! temp file plus rename so a partially written blob is never visible.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use super::errors::{RepoError, RepoResult};
use super::node::{NodeArena, NodeId};
use super::ContentRepository;

/// Local single-session repository implementation
#[derive(Debug)]
pub struct LocalRepository {
    root: PathBuf,
    arena: NodeArena,
    /// node -> namespace -> binary names, sorted
    binaries: BTreeMap<usize, BTreeMap<String, BTreeSet<String>>>,
    closed: bool,
}

impl LocalRepository {
    /// Initialize a repository session at a storage location.
    pub fn init(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        let blobs = root.join("blobs");
        fs::create_dir_all(&blobs).map_err(|e| RepoError::io_at(&blobs, e))?;
        Ok(Self {
            root,
            arena: NodeArena::new(),
            binaries: BTreeMap::new(),
            closed: false,
        })
    }

    fn guard(&self) -> RepoResult<()> {
        if self.closed {
            Err(RepoError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn blob_path(&self, node: NodeId, ns: &str, name: &str) -> PathBuf {
        // namespaces may be multi-segment rel paths; flatten for the fs
        let ns = ns.replace('/', "_");
        self.root
            .join("blobs")
            .join(node.index().to_string())
            .join(ns)
            .join(name)
    }
}

impl ContentRepository for LocalRepository {
    fn lookup(&self, path: &str) -> RepoResult<Option<NodeId>> {
        self.guard()?;
        Ok(self.arena.lookup(path))
    }

    fn ensure_path(&mut self, path: &str) -> RepoResult<NodeId> {
        self.guard()?;
        Ok(self.arena.ensure_path(path))
    }

    fn path_of(&self, node: NodeId) -> RepoResult<String> {
        self.guard()?;
        Ok(self.arena.path_of(node).to_string())
    }

    fn children(&self, node: NodeId) -> RepoResult<Vec<(String, NodeId)>> {
        self.guard()?;
        Ok(self.arena.children(node))
    }

    fn set_property(&mut self, node: NodeId, ns: &str, key: &str, value: &str) -> RepoResult<()> {
        self.guard()?;
        self.arena.set_property(node, ns, key, value);
        Ok(())
    }

    fn property(&self, node: NodeId, ns: &str, key: &str) -> RepoResult<Option<String>> {
        self.guard()?;
        Ok(self.arena.property(node, ns, key).map(str::to_string))
    }

    fn remove_property(&mut self, node: NodeId, ns: &str, key: &str) -> RepoResult<bool> {
        self.guard()?;
        Ok(self.arena.remove_property(node, ns, key))
    }

    fn namespaces(&self, node: NodeId) -> RepoResult<Vec<String>> {
        self.guard()?;
        Ok(self.arena.namespaces(node))
    }

    fn properties(&self, node: NodeId, ns: &str) -> RepoResult<Vec<(String, String)>> {
        self.guard()?;
        Ok(self.arena.properties(node, ns))
    }

    fn set_binary(&mut self, node: NodeId, ns: &str, name: &str, data: &[u8]) -> RepoResult<()> {
        self.guard()?;
        let path = self.blob_path(node, ns, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RepoError::io_at(parent, e))?;
        }

        // temp file + rename keeps partial writes invisible
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(|e| RepoError::io_at(&tmp, e))?;
        file.write_all(data).map_err(|e| RepoError::io_at(&tmp, e))?;
        file.sync_all().map_err(|e| RepoError::io_at(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| RepoError::io_at(&path, e))?;

        self.binaries
            .entry(node.index())
            .or_default()
            .entry(ns.to_string())
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    fn binary(&self, node: NodeId, ns: &str, name: &str) -> RepoResult<Option<Vec<u8>>> {
        self.guard()?;
        let known = self
            .binaries
            .get(&node.index())
            .and_then(|m| m.get(ns))
            .map(|s| s.contains(name))
            .unwrap_or(false);
        if !known {
            return Ok(None);
        }
        let path = self.blob_path(node, ns, name);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepoError::io_at(&path, e)),
        }
    }

    fn binary_names(&self, node: NodeId, ns: &str) -> RepoResult<Vec<String>> {
        self.guard()?;
        Ok(self
            .binaries
            .get(&node.index())
            .and_then(|m| m.get(ns))
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_binary(&mut self, node: NodeId, ns: &str, name: &str) -> RepoResult<bool> {
        self.guard()?;
        let existed = self
            .binaries
            .get_mut(&node.index())
            .and_then(|m| m.get_mut(ns))
            .map(|s| s.remove(name))
            .unwrap_or(false);
        if existed {
            let path = self.blob_path(node, ns, name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RepoError::io_at(&path, e)),
            }
        }
        Ok(existed)
    }

    fn save(&mut self) -> RepoResult<()> {
        self.guard()?;
        // blob writes are individually fsynced; sync the blobs directory so
        // renames are durable too
        let blobs = self.root.join("blobs");
        let dir = OpenOptions::new()
            .read(true)
            .open(&blobs)
            .map_err(|e| RepoError::io_at(&blobs, e))?;
        dir.sync_all().map_err(|e| RepoError::io_at(&blobs, e))?;
        Ok(())
    }

    fn close(&mut self) -> RepoResult<()> {
        self.guard()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_repo() -> (LocalRepository, TempDir) {
        let temp = TempDir::new().unwrap();
        let repo = LocalRepository::init(temp.path()).unwrap();
        (repo, temp)
    }

    #[test]
    fn test_binary_write_read_delete() {
        let (mut repo, _temp) = open_repo();
        let node = repo.ensure_path("/world/europe").unwrap();

        repo.set_binary(node, "germany", "blob-1", b"content").unwrap();
        assert_eq!(repo.binary(node, "germany", "blob-1").unwrap().unwrap(), b"content");
        assert_eq!(repo.binary_names(node, "germany").unwrap(), vec!["blob-1"]);

        assert!(repo.delete_binary(node, "germany", "blob-1").unwrap());
        assert!(repo.binary(node, "germany", "blob-1").unwrap().is_none());
        assert!(!repo.delete_binary(node, "germany", "blob-1").unwrap());
    }

    #[test]
    fn test_binary_unknown_is_none() {
        let (mut repo, _temp) = open_repo();
        let node = repo.ensure_path("/world").unwrap();
        assert!(repo.binary(node, "ns", "missing").unwrap().is_none());
    }

    #[test]
    fn test_properties_scoped_by_namespace() {
        let (mut repo, _temp) = open_repo();
        let node = repo.ensure_path("/world/europe").unwrap();

        repo.set_property(node, "germany", "flag", "black-red-gold").unwrap();
        repo.set_property(node, "france", "flag", "tricolore").unwrap();

        assert_eq!(
            repo.property(node, "germany", "flag").unwrap().as_deref(),
            Some("black-red-gold")
        );
        assert_eq!(repo.namespaces(node).unwrap(), vec!["france", "germany"]);
    }

    #[test]
    fn test_close_then_operations_fail() {
        let (mut repo, _temp) = open_repo();
        repo.close().unwrap();

        assert!(matches!(repo.lookup("/"), Err(RepoError::SessionClosed)));
        assert!(matches!(repo.ensure_path("/x"), Err(RepoError::SessionClosed)));
        // close is exactly-once
        assert!(matches!(repo.close(), Err(RepoError::SessionClosed)));
    }

    #[test]
    fn test_save_after_writes() {
        let (mut repo, _temp) = open_repo();
        let node = repo.ensure_path("/a").unwrap();
        repo.set_binary(node, "ns", "n", b"x").unwrap();
        repo.save().unwrap();
    }
}
