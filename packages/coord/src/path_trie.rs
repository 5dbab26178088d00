//! A generic prefix trie keyed by path components.
//!
//! `PathTrie<T>` provides O(k) operations where k is the path depth.
//! Each node can optionally hold a value, and has children indexed by path component.

use std::collections::BTreeMap;

use crate::StorePath;

/// A prefix trie keyed by path components.
///
/// Both the in-process ensemble and the tree caches keep their node tree in
/// one of these: a store node is a trie node holding a value, its children
/// are the trie node's children.
///
/// # Example
///
/// ```rust
/// use subreg_coord::{PathTrie, StorePath};
///
/// let mut trie: PathTrie<i32> = PathTrie::new();
/// trie.insert(&StorePath::parse("/a/b").unwrap(), 1);
/// trie.insert(&StorePath::parse("/a/c").unwrap(), 2);
///
/// let names: Vec<_> = trie
///     .get_subtrie(&StorePath::parse("/a").unwrap())
///     .unwrap()
///     .children()
///     .map(|(name, _)| name.clone())
///     .collect();
/// assert_eq!(names, vec!["b", "c"]);
/// ```
#[derive(Debug, Clone)]
pub struct PathTrie<T> {
    value: Option<T>,
    children: BTreeMap<String, PathTrie<T>>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> PathTrie<T> {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigate to node, creating intermediate nodes as needed.
    fn get_or_create_node(&mut self, path: &StorePath) -> &mut PathTrie<T> {
        let mut current = self;
        for component in &path.components {
            current = current.children.entry(component.clone()).or_default();
        }
        current
    }

    /// Navigate to node if it exists.
    fn get_node(&self, path: &StorePath) -> Option<&PathTrie<T>> {
        let mut current = self;
        for component in &path.components {
            current = current.children.get(component)?;
        }
        Some(current)
    }

    /// Navigate to node if it exists (mutable).
    fn get_node_mut(&mut self, path: &StorePath) -> Option<&mut PathTrie<T>> {
        let mut current = self;
        for component in &path.components {
            current = current.children.get_mut(component)?;
        }
        Some(current)
    }

    /// Insert a value at path. Returns previous value if any.
    pub fn insert(&mut self, path: &StorePath, value: T) -> Option<T> {
        let node = self.get_or_create_node(path);
        node.value.replace(value)
    }

    /// Remove and return entire subtree at path.
    pub fn remove_subtree(&mut self, path: &StorePath) -> Option<PathTrie<T>> {
        match path.parent() {
            None => {
                let old = std::mem::take(self);
                if old.value.is_some() || !old.children.is_empty() {
                    Some(old)
                } else {
                    None
                }
            }
            Some(parent_path) => {
                let child_name = &path.components[path.len() - 1];
                let parent = self.get_node_mut(&parent_path)?;
                parent.children.remove(child_name)
            }
        }
    }

    /// Get reference to value at exact path.
    pub fn get(&self, path: &StorePath) -> Option<&T> {
        self.get_node(path)?.value.as_ref()
    }

    /// Get mutable reference to value at exact path.
    pub fn get_mut(&mut self, path: &StorePath) -> Option<&mut T> {
        self.get_node_mut(path)?.value.as_mut()
    }

    /// Get reference to subtrie at path.
    pub fn get_subtrie(&self, path: &StorePath) -> Option<&PathTrie<T>> {
        self.get_node(path)
    }

    /// Check if exact path has a value.
    pub fn contains_value(&self, path: &StorePath) -> bool {
        self.get(path).is_some()
    }

    /// Value held by this node.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Direct children of this node, in name order.
    pub fn children(&self) -> impl Iterator<Item = (&String, &PathTrie<T>)> {
        self.children.iter()
    }

    /// Whether this node has any children.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Count of values in trie (not nodes).
    pub fn len(&self) -> usize {
        let self_count = usize::from(self.value.is_some());
        let children_count: usize = self.children.values().map(|child| child.len()).sum();
        self_count + children_count
    }

    /// True if no values anywhere in trie.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(|c| c.is_empty())
    }

    /// Iterate over all (path, value) pairs, parents before children.
    pub fn iter(&self) -> PathTrieIter<'_, T> {
        PathTrieIter::new(self)
    }
}

/// Iterator over (StorePath, &T) pairs in a PathTrie.
pub struct PathTrieIter<'a, T> {
    stack: Vec<(StorePath, &'a PathTrie<T>)>,
}

impl<'a, T> PathTrieIter<'a, T> {
    fn new(trie: &'a PathTrie<T>) -> Self {
        Self {
            stack: vec![(StorePath::root(), trie)],
        }
    }
}

impl<'a, T> Iterator for PathTrieIter<'a, T> {
    type Item = (StorePath, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            // Reverse so children come out in name order
            for (name, child) in node.children.iter().rev() {
                let mut components = path.components.clone();
                components.push(name.clone());
                self.stack.push((StorePath { components }, child));
            }

            if let Some(ref value) = node.value {
                return Some((path, value));
            }
        }
        None
    }
}
