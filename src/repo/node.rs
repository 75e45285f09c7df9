//! Arena-backed node tree
//!
//! Nodes live in a flat arena indexed by stable integer ids, with a path→id
//! lookup table. Parent/child links are ids, never references, so the tree has
//! no cyclic ownership. Children and properties are kept in sorted maps so
//! every traversal is deterministic.

use std::collections::{BTreeMap, HashMap};

use super::path;

/// Stable identifier of a node within one repository session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct NodeSlot {
    path: String,
    parent: Option<NodeId>,
    /// child name -> id, sorted by name
    children: BTreeMap<String, NodeId>,
    /// namespace -> key -> value, last write wins
    properties: BTreeMap<String, BTreeMap<String, String>>,
}

/// The node tree: exactly one root, compositional ownership via the arena.
#[derive(Debug)]
pub struct NodeArena {
    slots: Vec<NodeSlot>,
    by_path: HashMap<String, NodeId>,
}

impl NodeArena {
    pub fn new() -> Self {
        let root = NodeSlot {
            path: path::ROOT.to_string(),
            parent: None,
            children: BTreeMap::new(),
            properties: BTreeMap::new(),
        };
        let mut by_path = HashMap::new();
        by_path.insert(path::ROOT.to_string(), NodeId(0));
        Self {
            slots: vec![root],
            by_path,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn lookup(&self, p: &str) -> Option<NodeId> {
        self.by_path.get(&path::normalize(p)).copied()
    }

    /// Get or create the node at `p`, creating missing intermediate segments.
    pub fn ensure_path(&mut self, p: &str) -> NodeId {
        let normalized = path::normalize(p);
        if let Some(id) = self.by_path.get(&normalized) {
            return *id;
        }
        let mut current = self.root();
        let mut current_path = String::new();
        for segment in path::segments(&normalized) {
            current_path.push('/');
            current_path.push_str(segment);
            current = match self.slots[current.0].children.get(segment) {
                Some(id) => *id,
                None => {
                    let id = NodeId(self.slots.len());
                    self.slots.push(NodeSlot {
                        path: current_path.clone(),
                        parent: Some(current),
                        children: BTreeMap::new(),
                        properties: BTreeMap::new(),
                    });
                    self.slots[current.0]
                        .children
                        .insert(segment.to_string(), id);
                    self.by_path.insert(current_path.clone(), id);
                    id
                }
            };
        }
        current
    }

    pub fn path_of(&self, id: NodeId) -> &str {
        &self.slots[id.0].path
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    /// Children in name order
    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        self.slots[id.0]
            .children
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    pub fn set_property(&mut self, id: NodeId, ns: &str, key: &str, value: &str) {
        self.slots[id.0]
            .properties
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn property(&self, id: NodeId, ns: &str, key: &str) -> Option<&str> {
        self.slots[id.0]
            .properties
            .get(ns)
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }

    pub fn remove_property(&mut self, id: NodeId, ns: &str, key: &str) -> bool {
        self.slots[id.0]
            .properties
            .get_mut(ns)
            .map(|m| m.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Namespaces with at least one property, in sorted order
    pub fn namespaces(&self, id: NodeId) -> Vec<String> {
        self.slots[id.0].properties.keys().cloned().collect()
    }

    /// (key, value) pairs in one namespace, in key order
    pub fn properties(&self, id: NodeId, ns: &str) -> Vec<(String, String)> {
        self.slots[id.0]
            .properties
            .get(ns)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.slots.len()
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
