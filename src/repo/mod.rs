//! Hierarchical content repository interface
//!
//! The store consumes the underlying repository through this deliberately
//! narrow trait: get-or-create a node by path, scoped string properties,
//! scoped named binaries, enumeration for tree walks, save, close. The
//! engine behind it is an external collaborator; [`LocalRepository`] is the
//! bundled reference implementation (arena node tree, directory-backed
//! binaries) used by tests and single-process deployments.

pub mod errors;
mod local;
mod node;
pub mod path;

pub use errors::{RepoError, RepoResult};
pub use local::LocalRepository;
pub use node::{NodeArena, NodeId};

/// Narrow interface onto the hierarchical content repository.
///
/// One implementation instance is one session. Sessions are single-writer:
/// unsynchronized concurrent writes through the same session are not safe.
/// After [`close`](ContentRepository::close), every operation fails with
/// [`RepoError::SessionClosed`].
pub trait ContentRepository {
    /// Look up a node by normalized path.
    fn lookup(&self, path: &str) -> RepoResult<Option<NodeId>>;

    /// Get or create the node at `path`, creating missing intermediates.
    fn ensure_path(&mut self, path: &str) -> RepoResult<NodeId>;

    /// Normalized path of a node.
    fn path_of(&self, node: NodeId) -> RepoResult<String>;

    /// Children of a node as (name, id), in name order.
    fn children(&self, node: NodeId) -> RepoResult<Vec<(String, NodeId)>>;

    /// Set a string property scoped to node + namespace. Last write wins.
    fn set_property(&mut self, node: NodeId, ns: &str, key: &str, value: &str) -> RepoResult<()>;

    /// Read a scoped string property.
    fn property(&self, node: NodeId, ns: &str, key: &str) -> RepoResult<Option<String>>;

    /// Remove a scoped string property. Returns whether it existed.
    fn remove_property(&mut self, node: NodeId, ns: &str, key: &str) -> RepoResult<bool>;

    /// Namespaces of a node that hold properties, in sorted order.
    fn namespaces(&self, node: NodeId) -> RepoResult<Vec<String>>;

    /// All (key, value) properties in one namespace, in key order.
    fn properties(&self, node: NodeId, ns: &str) -> RepoResult<Vec<(String, String)>>;

    /// Persist a named binary scoped to node + namespace. The write is
    /// atomic: a partially written binary is never visible.
    fn set_binary(&mut self, node: NodeId, ns: &str, name: &str, data: &[u8]) -> RepoResult<()>;

    /// Read a named binary, `None` if absent.
    fn binary(&self, node: NodeId, ns: &str, name: &str) -> RepoResult<Option<Vec<u8>>>;

    /// Names of binaries in one namespace, in sorted order.
    fn binary_names(&self, node: NodeId, ns: &str) -> RepoResult<Vec<String>>;

    /// Delete a named binary. Returns whether it existed.
    fn delete_binary(&mut self, node: NodeId, ns: &str, name: &str) -> RepoResult<bool>;

    /// Flush pending changes.
    fn save(&mut self) -> RepoResult<()>;

    /// Release the session. Must be called exactly once; a second call fails.
    fn close(&mut self) -> RepoResult<()>;
}
