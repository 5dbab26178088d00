//! Client traits: CoordinationClient, TreeView.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Result, StoreEvent, StorePath};

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// The node lives until it is deleted.
    Persistent,
    /// The node is deleted automatically when the creating session ends.
    Ephemeral,
}

/// Options for [`CoordinationClient::create_or_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    pub mode: CreateMode,
    /// Create missing ancestors as container nodes.
    pub create_parents: bool,
}

impl CreateOptions {
    /// Ephemeral node, creating parents as needed.
    pub fn ephemeral() -> Self {
        Self {
            mode: CreateMode::Ephemeral,
            create_parents: true,
        }
    }

    /// Persistent node, creating parents as needed.
    pub fn persistent() -> Self {
        Self {
            mode: CreateMode::Persistent,
            create_parents: true,
        }
    }
}

/// What a successful create-or-set did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Options for [`CoordinationClient::delete`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Keep retrying the delete in the background until it is applied,
    /// even if this call reports a connection failure.
    pub guaranteed: bool,
}

impl DeleteOptions {
    pub fn guaranteed() -> Self {
        Self { guaranteed: true }
    }
}

/// A locally materialized view of a subtree of the store.
///
/// Reads never go to the network; they answer from whatever the watch has
/// received so far, which may be stale during an outage.
pub trait TreeView: Send + Sync {
    /// Children of the node at `path`, keyed by child name.
    ///
    /// # Returns
    ///
    /// * `None` - The node is not present in the view.
    /// * `Some(children)` - The node exists; the map may be empty.
    fn current_children(&self, path: &StorePath) -> Option<BTreeMap<String, Bytes>>;

    /// Data of the node at `path`, if present in the view.
    fn current_data(&self, path: &StorePath) -> Option<Bytes>;
}

/// A registered watch over a subtree.
///
/// `view` is kept current by the client; `events` receives a [`StoreEvent`]
/// after each change has been applied to `view`, interleaved with
/// connectivity transitions.
pub struct TreeWatch {
    pub view: Arc<dyn TreeView>,
    pub events: mpsc::UnboundedReceiver<StoreEvent>,
}

impl std::fmt::Debug for TreeWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWatch").finish_non_exhaustive()
    }
}

/// Client of a hierarchical coordination store with sessions.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn CoordinationClient>`.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Create the node at `path`, or overwrite its data if it exists.
    async fn create_or_set(
        &self,
        path: &StorePath,
        data: Bytes,
        options: CreateOptions,
    ) -> Result<WriteOutcome>;

    /// Delete the node at `path`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The node was deleted.
    /// * `Err(Error::NoNode)` - There was nothing to delete.
    /// * `Err(_)` - The delete was not applied (yet, if guaranteed).
    async fn delete(&self, path: &StorePath, options: DeleteOptions) -> Result<()>;

    /// Start watching the subtree rooted at `root`.
    ///
    /// Nodes that already exist are announced as `NodeAdded` events.
    fn watch_tree(&self, root: &StorePath) -> Result<TreeWatch>;
}

// Blanket implementations for shared and boxed clients

#[async_trait]
impl<T: CoordinationClient + ?Sized> CoordinationClient for Arc<T> {
    async fn create_or_set(
        &self,
        path: &StorePath,
        data: Bytes,
        options: CreateOptions,
    ) -> Result<WriteOutcome> {
        self.as_ref().create_or_set(path, data, options).await
    }

    async fn delete(&self, path: &StorePath, options: DeleteOptions) -> Result<()> {
        self.as_ref().delete(path, options).await
    }

    fn watch_tree(&self, root: &StorePath) -> Result<TreeWatch> {
        self.as_ref().watch_tree(root)
    }
}

#[async_trait]
impl<T: CoordinationClient + ?Sized> CoordinationClient for Box<T> {
    async fn create_or_set(
        &self,
        path: &StorePath,
        data: Bytes,
        options: CreateOptions,
    ) -> Result<WriteOutcome> {
        self.as_ref().create_or_set(path, data, options).await
    }

    async fn delete(&self, path: &StorePath, options: DeleteOptions) -> Result<()> {
        self.as_ref().delete(path, options).await
    }

    fn watch_tree(&self, root: &StorePath) -> Result<TreeWatch> {
        self.as_ref().watch_tree(root)
    }
}

impl<T: TreeView + ?Sized> TreeView for Arc<T> {
    fn current_children(&self, path: &StorePath) -> Option<BTreeMap<String, Bytes>> {
        self.as_ref().current_children(path)
    }

    fn current_data(&self, path: &StorePath) -> Option<Bytes> {
        self.as_ref().current_data(path)
    }
}
