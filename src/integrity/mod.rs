//! Tree integrity checking
//!
//! Walks a subtree and verifies every stored file against its persisted
//! metadata. The walk never aborts on a damaged entry: every finding is
//! collected into a [`CheckResult`] so one bad file cannot mask the rest of
//! the report. Runs after every restore and on demand.
//!
//! The checker holds no passwords. Unencrypted content is verified against
//! its plaintext checksum and size; encrypted content is verified for
//! envelope well-formedness only, since its checksum covers plaintext the
//! checker cannot see.

use std::fmt;

use tracing::{debug, info, warn};

use crate::archive::envelope;
use crate::repo::{ContentRepository, NodeId};
use crate::store::{compute_checksum, NodeStore, StoreError, StoreResult};

/// Aggregated findings of one integrity walk.
#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub visited_nodes: u64,
    pub visited_files: u64,
    /// Definite damage: missing content, checksum or size mismatch,
    /// unparsable metadata, malformed envelope
    pub errors: Vec<String>,
    /// Suspicious but not definitely damaged: stored binaries with no
    /// metadata record
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    fn error(&mut self, finding: String) {
        warn!(%finding, "integrity error");
        self.errors.push(finding);
    }

    fn warning(&mut self, finding: String) {
        debug!(%finding, "integrity warning");
        self.warnings.push(finding);
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} nodes, {} files: ",
            self.visited_nodes, self.visited_files
        )?;
        if self.is_clean() {
            write!(f, "clean")
        } else {
            write!(
                f,
                "{} errors, {} warnings",
                self.errors.len(),
                self.warnings.len()
            )
        }
    }
}

/// Walks subtrees and verifies stored files against their metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrityChecker;

impl IntegrityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check every node and file under `root_path`, inclusive.
    ///
    /// Per-file damage is collected, never raised; only repository access
    /// failures (e.g. a closed session) abort the walk.
    pub fn check_tree<R: ContentRepository>(
        &self,
        store: &NodeStore<R>,
        root_path: &str,
    ) -> StoreResult<CheckResult> {
        let root = store
            .repo()
            .lookup(root_path)?
            .ok_or_else(|| StoreError::NodeNotFound(root_path.to_string()))?;

        let mut result = CheckResult::default();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            self.check_node(store, node, &mut result)?;
            for (_, child) in store.repo().children(node)? {
                stack.push(child);
            }
        }

        info!(root = %root_path, %result, "integrity check finished");
        Ok(result)
    }

    fn check_node<R: ContentRepository>(
        &self,
        store: &NodeStore<R>,
        node: NodeId,
        result: &mut CheckResult,
    ) -> StoreResult<()> {
        result.visited_nodes += 1;
        let node_path = store.repo().path_of(node)?;

        for ns in store.repo().namespaces(node)? {
            let (records, damaged_keys) = store.file_records(node, &ns)?;
            for key in damaged_keys {
                result.error(format!(
                    "{} [{}]: unparsable file record under key '{}'",
                    node_path, ns, key
                ));
            }

            let mut known_ids = Vec::with_capacity(records.len());
            for record in records {
                result.visited_files += 1;
                known_ids.push(record.file_id.to_string());
                let at = format!("{} [{}] {} ({})", node_path, ns, record.file_name, record.file_id);

                let stored = match store.raw_binary(node, &ns, &record.file_id)? {
                    Some(stored) => stored,
                    None => {
                        result.error(format!("{}: stored content missing", at));
                        continue;
                    }
                };

                if record.encrypted {
                    match envelope::parse_header(&stored) {
                        Ok(header) if header.is_encrypted() => {}
                        Ok(_) => result.error(format!(
                            "{}: marked encrypted but stored as plaintext envelope",
                            at
                        )),
                        Err(e) => result.error(format!("{}: malformed envelope ({})", at, e)),
                    }
                } else {
                    if stored.len() as u64 != record.size {
                        result.error(format!(
                            "{}: size mismatch (recorded {}, stored {})",
                            at,
                            record.size,
                            stored.len()
                        ));
                    }
                    let checksum = compute_checksum(&stored);
                    if checksum != record.checksum {
                        result.error(format!("{}: checksum mismatch", at));
                    }
                }
            }

            for name in store.repo().binary_names(node, &ns)? {
                if !known_ids.iter().any(|id| id == &name) {
                    result.warning(format!(
                        "{} [{}]: stored binary '{}' has no metadata record",
                        node_path, ns, name
                    ));
                }
            }
        }
        Ok(())
    }
}
