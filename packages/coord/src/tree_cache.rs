//! TreeCache: a local mirror of one subtree of the store.
//!
//! The cache is what a [`TreeView`] answers from. A client applies every
//! change it learns about to the cache first and only then publishes the
//! resulting [`StoreEvent`], so a listener reacting to an event always sees
//! state at least as new as the event.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::path_trie::PathTrie;
use crate::{StoreEvent, StorePath, TreeView};

/// Materialized copy of the nodes under `root`, including `root` itself.
#[derive(Debug)]
pub struct TreeCache {
    root: StorePath,
    nodes: RwLock<PathTrie<Bytes>>,
}

impl TreeCache {
    /// Create an empty cache for the subtree at `root`.
    pub fn new(root: StorePath) -> Self {
        Self {
            root,
            nodes: RwLock::new(PathTrie::new()),
        }
    }

    /// Root of the mirrored subtree.
    pub fn root(&self) -> &StorePath {
        &self.root
    }

    /// Whether `path` falls inside the mirrored subtree.
    pub fn covers(&self, path: &StorePath) -> bool {
        path.has_prefix(&self.root)
    }

    /// Number of nodes currently mirrored.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True if nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Record that the node at `path` now holds `data`.
    ///
    /// Returns the event to publish, or `None` when `path` is outside the
    /// mirrored subtree.
    pub fn apply_set(&self, path: &StorePath, data: Bytes) -> Option<StoreEvent> {
        if !self.covers(path) {
            return None;
        }
        let previous = self.nodes.write().insert(path, data.clone());
        Some(match previous {
            None => StoreEvent::NodeAdded {
                path: path.clone(),
                data,
            },
            Some(_) => StoreEvent::NodeUpdated {
                path: path.clone(),
                data,
            },
        })
    }

    /// Record that the node at `path` (and anything below it) is gone.
    ///
    /// Returns one `NodeRemoved` per mirrored node that disappeared,
    /// children before parents.
    pub fn apply_remove(&self, path: &StorePath) -> Vec<StoreEvent> {
        if !self.covers(path) {
            return Vec::new();
        }
        let removed = match self.nodes.write().remove_subtree(path) {
            Some(subtree) => subtree,
            None => return Vec::new(),
        };

        let mut paths: Vec<StorePath> = removed.iter().map(|(rel, _)| path.join(&rel)).collect();
        paths.reverse();
        paths
            .into_iter()
            .map(|path| StoreEvent::NodeRemoved { path })
            .collect()
    }

    /// Replace the mirrored content with a fresh `snapshot` of the subtree.
    ///
    /// Used after a reconnection, when changes may have been missed.
    /// Returns the events describing the difference between the old and
    /// the new content: removals (deepest first), then additions and
    /// updates (parents first).
    pub fn reset(&self, snapshot: Vec<(StorePath, Bytes)>) -> Vec<StoreEvent> {
        let fresh: BTreeMap<StorePath, Bytes> = snapshot
            .into_iter()
            .filter(|(path, _)| self.covers(path))
            .collect();

        let mut nodes = self.nodes.write();
        let stale: BTreeMap<StorePath, Bytes> = nodes
            .iter()
            .map(|(path, data)| (path, data.clone()))
            .collect();

        let mut events = Vec::new();
        for path in stale.keys().rev() {
            if !fresh.contains_key(path) {
                events.push(StoreEvent::NodeRemoved { path: path.clone() });
            }
        }
        for (path, data) in &fresh {
            match stale.get(path) {
                None => events.push(StoreEvent::NodeAdded {
                    path: path.clone(),
                    data: data.clone(),
                }),
                Some(old) if old != data => events.push(StoreEvent::NodeUpdated {
                    path: path.clone(),
                    data: data.clone(),
                }),
                Some(_) => {}
            }
        }

        let mut rebuilt = PathTrie::new();
        for (path, data) in fresh {
            rebuilt.insert(&path, data);
        }
        *nodes = rebuilt;

        events
    }
}

impl TreeView for TreeCache {
    fn current_children(&self, path: &StorePath) -> Option<BTreeMap<String, Bytes>> {
        let nodes = self.nodes.read();
        let node = nodes.get_subtrie(path)?;
        if node.value().is_none() && !node.has_children() {
            return None;
        }
        Some(
            node.children()
                .filter_map(|(name, child)| child.value().map(|data| (name.clone(), data.clone())))
                .collect(),
        )
    }

    fn current_data(&self, path: &StorePath) -> Option<Bytes> {
        self.nodes.read().get(path).cloned()
    }
}
