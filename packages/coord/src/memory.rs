//! In-process coordination store.
//!
//! `MemoryEnsemble` keeps a node tree with the semantics the registry relies
//! on from a real ensemble: sessions, ephemeral nodes tied to them, container
//! parents that vanish with their last child, guaranteed deletes, and
//! watches that see every change. Each [`MemoryClient`] is one session
//! holder whose connectivity can be driven by hand:
//!
//! ```text
//!            suspend()             expire_session()
//! Connected ──────────► Suspended ─────────────────► Expired
//!     ▲                     │                           │
//!     └──── reconnect() ────┴──────── reconnect() ──────┘
//!                                (new session id)
//! ```
//!
//! Writes are applied synchronously: by the time a write future resolves,
//! the tree caches of every connected client already reflect it and the
//! matching events are queued.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use subreg_coord::{CoordinationClient, CreateOptions, MemoryEnsemble, StorePath, TreeView};
//!
//! # tokio_test_block(async {
//! let ensemble = MemoryEnsemble::new();
//! let client = ensemble.connect();
//! let watch = client.watch_tree(&StorePath::parse("/subs").unwrap()).unwrap();
//!
//! let leaf = StorePath::parse("/subs/svc/node-1").unwrap();
//! client.create_or_set(&leaf, Bytes::from_static(b"x"), CreateOptions::ephemeral()).await.unwrap();
//!
//! let children = watch.view.current_children(&StorePath::parse("/subs/svc").unwrap()).unwrap();
//! assert_eq!(children.len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::path_trie::PathTrie;
use crate::tree_cache::TreeCache;
use crate::{
    CoordinationClient, CreateMode, CreateOptions, DeleteOptions, Error, PathError, Result,
    StoreEvent, StorePath, TreeWatch, WriteOutcome,
};

/// Identifier of a client session.
pub type SessionId = u64;

type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Persistent,
    Container,
    Ephemeral(SessionId),
}

#[derive(Debug, Clone)]
struct ZNode {
    data: Bytes,
    kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connected,
    Suspended,
    Expired,
    Closed,
}

/// A change to publish to watches.
enum Change {
    Set(StorePath, Bytes),
    Removed(StorePath),
}

struct Watch {
    cache: Arc<TreeCache>,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl Watch {
    fn send(&self, event: StoreEvent) {
        // A closed receiver means the watcher went away; pruned on next publish.
        let _ = self.tx.send(event);
    }
}

#[derive(Default)]
struct FaultPlan {
    failing_writes: usize,
    failing_deletes: usize,
}

struct ClientState {
    session: SessionId,
    phase: Phase,
    watches: Vec<Watch>,
    pending_deletes: Vec<StorePath>,
    faults: FaultPlan,
    written: Vec<StorePath>,
}

impl ClientState {
    fn ensure_connected(&self) -> Result<()> {
        match self.phase {
            Phase::Connected => Ok(()),
            Phase::Suspended | Phase::Expired => Err(Error::ConnectionLoss),
            Phase::Closed => Err(Error::Closed),
        }
    }

    fn notify(&mut self, event: StoreEvent) {
        self.watches.retain(|w| !w.tx.is_closed());
        for watch in &self.watches {
            watch.send(event.clone());
        }
    }
}

struct EnsembleState {
    tree: PathTrie<ZNode>,
    next_session: SessionId,
    next_client: ClientId,
    clients: HashMap<ClientId, ClientState>,
}

impl Default for EnsembleState {
    fn default() -> Self {
        Self {
            tree: PathTrie::new(),
            next_session: 1,
            next_client: 1,
            clients: HashMap::new(),
        }
    }
}

impl EnsembleState {
    fn open_session(&mut self) -> SessionId {
        let id = self.next_session;
        self.next_session += 1;
        id
    }

    fn client_mut(&mut self, id: ClientId) -> Result<&mut ClientState> {
        self.clients.get_mut(&id).ok_or(Error::Closed)
    }

    /// Push changes into the caches of every connected client.
    fn publish(&mut self, changes: &[Change]) {
        for client in self.clients.values_mut() {
            if client.phase != Phase::Connected {
                continue;
            }
            client.watches.retain(|w| !w.tx.is_closed());
            for watch in &client.watches {
                for change in changes {
                    match change {
                        Change::Set(path, data) => {
                            if let Some(event) = watch.cache.apply_set(path, data.clone()) {
                                watch.send(event);
                            }
                        }
                        Change::Removed(path) => {
                            for event in watch.cache.apply_remove(path) {
                                watch.send(event);
                            }
                        }
                    }
                }
            }
        }
    }

    fn snapshot_under(&self, root: &StorePath) -> Vec<(StorePath, Bytes)> {
        self.tree
            .get_subtrie(root)
            .map(|subtree| {
                subtree
                    .iter()
                    .map(|(rel, node)| (root.join(&rel), node.data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn create_or_set(
        &mut self,
        path: &StorePath,
        data: Bytes,
        options: CreateOptions,
        session: SessionId,
    ) -> Result<(WriteOutcome, Vec<Change>)> {
        if path.is_empty() {
            return Err(Error::Path(PathError::InvalidPath {
                message: "cannot write the store root".to_string(),
            }));
        }

        let mut changes = Vec::new();
        for depth in 1..path.len() {
            let ancestor = StorePath {
                components: path.components[..depth].to_vec(),
            };
            match self.tree.get(&ancestor).map(|node| node.kind) {
                Some(NodeKind::Ephemeral(_)) => {
                    return Err(Error::Unavailable {
                        message: format!("ephemeral node {} cannot have children", ancestor),
                    });
                }
                Some(_) => {}
                None if options.create_parents => {
                    self.tree.insert(
                        &ancestor,
                        ZNode {
                            data: Bytes::new(),
                            kind: NodeKind::Container,
                        },
                    );
                    changes.push(Change::Set(ancestor, Bytes::new()));
                }
                None => return Err(Error::NoNode { path: ancestor }),
            }
        }

        let outcome = if let Some(node) = self.tree.get_mut(path) {
            node.data = data.clone();
            WriteOutcome::Updated
        } else {
            let kind = match options.mode {
                CreateMode::Persistent => NodeKind::Persistent,
                CreateMode::Ephemeral => NodeKind::Ephemeral(session),
            };
            self.tree.insert(
                path,
                ZNode {
                    data: data.clone(),
                    kind,
                },
            );
            WriteOutcome::Created
        };
        changes.push(Change::Set(path.clone(), data));
        Ok((outcome, changes))
    }

    fn remove_node(&mut self, path: &StorePath) -> Result<Vec<Change>> {
        let node = self
            .tree
            .get_subtrie(path)
            .filter(|node| node.value().is_some() && !path.is_empty())
            .ok_or_else(|| Error::NoNode { path: path.clone() })?;
        if node.has_children() {
            return Err(Error::NotEmpty { path: path.clone() });
        }

        self.tree.remove_subtree(path);
        let mut changes = vec![Change::Removed(path.clone())];

        // Containers go away with their last child.
        let mut current = path.parent();
        while let Some(parent) = current {
            if parent.is_empty() {
                break;
            }
            let prune = matches!(
                self.tree.get_subtrie(&parent),
                Some(node) if !node.has_children()
                    && matches!(node.value(), Some(ZNode { kind: NodeKind::Container, .. }))
            );
            if !prune {
                break;
            }
            self.tree.remove_subtree(&parent);
            current = parent.parent();
            changes.push(Change::Removed(parent));
        }
        Ok(changes)
    }

    fn expire_ephemerals(&mut self, session: SessionId) -> Vec<Change> {
        let mut owned: Vec<StorePath> = self
            .tree
            .iter()
            .filter(|(_, node)| node.kind == NodeKind::Ephemeral(session))
            .map(|(path, _)| path)
            .collect();
        owned.reverse();

        let mut changes = Vec::new();
        for path in owned {
            match self.remove_node(&path) {
                Ok(removed) => changes.extend(removed),
                Err(e) => debug!(%path, error = %e, "ephemeral node already gone"),
            }
        }
        changes
    }
}

/// A shared in-process node tree that clients connect to.
#[derive(Clone, Default)]
pub struct MemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl MemoryEnsemble {
    /// Create an empty ensemble.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client with a fresh session.
    pub fn connect(&self) -> MemoryClient {
        let mut state = self.state.lock();
        let session = state.open_session();
        let id = state.next_client;
        state.next_client += 1;
        state.clients.insert(
            id,
            ClientState {
                session,
                phase: Phase::Connected,
                watches: Vec::new(),
                pending_deletes: Vec::new(),
                faults: FaultPlan::default(),
                written: Vec::new(),
            },
        );
        debug!(client = id, session, "client connected");
        MemoryClient {
            ensemble: self.clone(),
            id,
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.state.lock().tree.len()
    }

    /// Data held by the node at `path`.
    pub fn data(&self, path: &StorePath) -> Option<Bytes> {
        self.state.lock().tree.get(path).map(|node| node.data.clone())
    }

    /// Names of the children of the node at `path`.
    pub fn children(&self, path: &StorePath) -> Vec<String> {
        self.state
            .lock()
            .tree
            .get_subtrie(path)
            .map(|node| node.children().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether the node at `path` is ephemeral.
    pub fn is_ephemeral(&self, path: &StorePath) -> bool {
        matches!(
            self.state.lock().tree.get(path),
            Some(ZNode {
                kind: NodeKind::Ephemeral(_),
                ..
            })
        )
    }
}

/// One client session against a [`MemoryEnsemble`].
#[derive(Clone)]
pub struct MemoryClient {
    ensemble: MemoryEnsemble,
    id: ClientId,
}

impl MemoryClient {
    /// Current session id. `None` once the client is closed.
    pub fn session_id(&self) -> Option<SessionId> {
        let state = self.ensemble.state.lock();
        state
            .clients
            .get(&self.id)
            .filter(|c| c.phase != Phase::Closed)
            .map(|c| c.session)
    }

    /// Whether operations currently reach the ensemble.
    pub fn is_connected(&self) -> bool {
        let state = self.ensemble.state.lock();
        matches!(
            state.clients.get(&self.id).map(|c| c.phase),
            Some(Phase::Connected)
        )
    }

    /// Interrupt the connection without ending the session.
    pub fn suspend(&self) {
        let mut state = self.ensemble.state.lock();
        if let Ok(client) = state.client_mut(self.id) {
            if client.phase == Phase::Connected {
                client.phase = Phase::Suspended;
                debug!(client = self.id, "connection suspended");
                client.notify(StoreEvent::ConnectionSuspended);
            }
        }
    }

    /// End the session as the ensemble would after a timeout.
    ///
    /// Ephemeral nodes owned by the session are removed and other clients
    /// observe the removals.
    pub fn expire_session(&self) {
        let mut state = self.ensemble.state.lock();
        let session = match state.client_mut(self.id) {
            Ok(client) if matches!(client.phase, Phase::Connected | Phase::Suspended) => {
                client.phase = Phase::Expired;
                client.session
            }
            _ => return,
        };

        let changes = state.expire_ephemerals(session);
        state.publish(&changes);
        debug!(client = self.id, session, removed = changes.len(), "session expired");

        if let Ok(client) = state.client_mut(self.id) {
            client.notify(StoreEvent::ConnectionLost);
        }
    }

    /// Restore the connection.
    ///
    /// Opens a new session if the old one expired, applies guaranteed
    /// deletes that were issued while disconnected, and resynchronizes every
    /// tree cache, emitting the differences after `ConnectionReconnected`.
    /// Calling this while connected simulates a short blip.
    pub fn reconnect(&self) -> Result<()> {
        let mut state = self.ensemble.state.lock();
        let phase = state.client_mut(self.id)?.phase;
        if phase == Phase::Closed {
            return Err(Error::Closed);
        }
        let new_session = (phase == Phase::Expired).then(|| state.open_session());

        let pending = {
            let client = state.client_mut(self.id)?;
            if let Some(session) = new_session {
                client.session = session;
            }
            client.phase = Phase::Connected;
            std::mem::take(&mut client.pending_deletes)
        };

        if let Ok(client) = state.client_mut(self.id) {
            client.notify(StoreEvent::ConnectionReconnected);
        }

        let mut changes = Vec::new();
        for path in pending {
            match state.remove_node(&path) {
                Ok(removed) => changes.extend(removed),
                Err(e) => debug!(%path, error = %e, "pending delete had nothing to remove"),
            }
        }
        state.publish(&changes);

        let roots: Vec<StorePath> = state
            .clients
            .get(&self.id)
            .map(|c| c.watches.iter().map(|w| w.cache.root().clone()).collect())
            .unwrap_or_default();
        let snapshots: Vec<Vec<(StorePath, Bytes)>> =
            roots.iter().map(|root| state.snapshot_under(root)).collect();

        let client = state.client_mut(self.id)?;
        for (watch, snapshot) in client.watches.iter().zip(snapshots) {
            for event in watch.cache.reset(snapshot) {
                watch.send(event);
            }
        }
        debug!(client = self.id, session = client.session, "client reconnected");
        Ok(())
    }

    /// End the session and stop the client. Ephemeral nodes are removed.
    pub fn close(&self) {
        self.expire_session();
        let mut state = self.ensemble.state.lock();
        if let Ok(client) = state.client_mut(self.id) {
            client.phase = Phase::Closed;
            client.watches.clear();
        }
    }

    /// Make the next `n` create-or-set calls fail.
    pub fn fail_next_writes(&self, n: usize) {
        if let Ok(client) = self.ensemble.state.lock().client_mut(self.id) {
            client.faults.failing_writes = n;
        }
    }

    /// Make the next `n` delete calls fail.
    pub fn fail_next_deletes(&self, n: usize) {
        if let Ok(client) = self.ensemble.state.lock().client_mut(self.id) {
            client.faults.failing_deletes = n;
        }
    }

    /// Number of create-or-set calls issued so far.
    pub fn write_count(&self) -> usize {
        self.written_paths().len()
    }

    /// Paths of all create-or-set calls issued so far, in order.
    pub fn written_paths(&self) -> Vec<StorePath> {
        let state = self.ensemble.state.lock();
        state
            .clients
            .get(&self.id)
            .map(|c| c.written.clone())
            .unwrap_or_default()
    }

    /// Forget the recorded create-or-set calls.
    pub fn reset_write_log(&self) {
        if let Ok(client) = self.ensemble.state.lock().client_mut(self.id) {
            client.written.clear();
        }
    }

    /// Guaranteed deletes waiting for the connection to come back.
    pub fn pending_delete_count(&self) -> usize {
        let state = self.ensemble.state.lock();
        state
            .clients
            .get(&self.id)
            .map(|c| c.pending_deletes.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn create_or_set(
        &self,
        path: &StorePath,
        data: Bytes,
        options: CreateOptions,
    ) -> Result<WriteOutcome> {
        let mut state = self.ensemble.state.lock();
        let session = {
            let client = state.client_mut(self.id)?;
            client.written.push(path.clone());
            client.ensure_connected()?;
            if client.faults.failing_writes > 0 {
                client.faults.failing_writes -= 1;
                return Err(Error::Unavailable {
                    message: format!("injected write failure for {}", path),
                });
            }
            client.session
        };

        let (outcome, changes) = state.create_or_set(path, data, options, session)?;
        state.publish(&changes);
        Ok(outcome)
    }

    async fn delete(&self, path: &StorePath, options: DeleteOptions) -> Result<()> {
        let mut state = self.ensemble.state.lock();
        {
            let client = state.client_mut(self.id)?;
            if let Err(e) = client.ensure_connected() {
                if options.guaranteed && e == Error::ConnectionLoss {
                    client.pending_deletes.push(path.clone());
                }
                return Err(e);
            }
            if client.faults.failing_deletes > 0 {
                client.faults.failing_deletes -= 1;
                return Err(Error::Unavailable {
                    message: format!("injected delete failure for {}", path),
                });
            }
        }

        let changes = state.remove_node(path)?;
        state.publish(&changes);
        Ok(())
    }

    fn watch_tree(&self, root: &StorePath) -> Result<TreeWatch> {
        let mut state = self.ensemble.state.lock();
        let snapshot = state.snapshot_under(root);
        let client = state.client_mut(self.id)?;
        if client.phase == Phase::Closed {
            return Err(Error::Closed);
        }

        let cache = Arc::new(TreeCache::new(root.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = Watch {
            cache: Arc::clone(&cache),
            tx,
        };

        if client.phase == Phase::Connected {
            for (path, data) in snapshot {
                if let Some(event) = watch.cache.apply_set(&path, data) {
                    watch.send(event);
                }
            }
        }
        client.watches.push(watch);

        Ok(TreeWatch {
            view: cache,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeView;

    fn p(s: &str) -> StorePath {
        StorePath::parse(s).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StoreEvent>) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn create_then_update() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let leaf = p("/subs/a/n-1");

        let first = client
            .create_or_set(&leaf, Bytes::from_static(b"1"), CreateOptions::ephemeral())
            .await
            .unwrap();
        let second = client
            .create_or_set(&leaf, Bytes::from_static(b"2"), CreateOptions::ephemeral())
            .await
            .unwrap();

        assert_eq!(first, WriteOutcome::Created);
        assert_eq!(second, WriteOutcome::Updated);
        assert_eq!(ensemble.data(&leaf), Some(Bytes::from_static(b"2")));
        assert!(ensemble.is_ephemeral(&leaf));
        assert!(!ensemble.is_ephemeral(&p("/subs/a")));
        // root container, address container, leaf
        assert_eq!(ensemble.node_count(), 3);
    }

    #[tokio::test]
    async fn missing_parent_without_create_parents() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let options = CreateOptions {
            mode: CreateMode::Persistent,
            create_parents: false,
        };
        let err = client
            .create_or_set(&p("/x/y"), Bytes::new(), options)
            .await
            .unwrap_err();
        assert_eq!(err, Error::NoNode { path: p("/x") });
    }

    #[tokio::test]
    async fn delete_prunes_empty_containers() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let leaf = p("/subs/a/n-1");
        client
            .create_or_set(&leaf, Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();

        client.delete(&leaf, DeleteOptions::guaranteed()).await.unwrap();
        assert_eq!(ensemble.node_count(), 0);

        let err = client.delete(&leaf, DeleteOptions::default()).await.unwrap_err();
        assert!(err.is_no_node());
    }

    #[tokio::test]
    async fn delete_with_children_fails() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();
        let err = client
            .delete(&p("/subs/a"), DeleteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotEmpty { path: p("/subs/a") });
    }

    #[tokio::test]
    async fn watch_announces_existing_nodes_and_changes() {
        let ensemble = MemoryEnsemble::new();
        let writer = ensemble.connect();
        let reader = ensemble.connect();
        writer
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();

        let mut watch = reader.watch_tree(&p("/subs")).unwrap();
        let initial = drain(&mut watch.events);
        assert_eq!(initial.len(), 3);
        assert!(initial
            .iter()
            .all(|e| matches!(e, StoreEvent::NodeAdded { .. })));

        writer
            .create_or_set(&p("/subs/a/n-2"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();
        let events = drain(&mut watch.events);
        assert_eq!(
            events,
            vec![StoreEvent::NodeAdded {
                path: p("/subs/a/n-2"),
                data: Bytes::new()
            }]
        );
        assert_eq!(watch.view.current_children(&p("/subs/a")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn watch_ignores_other_subtrees() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let mut watch = client.watch_tree(&p("/subs")).unwrap();
        client
            .create_or_set(&p("/elsewhere/x"), Bytes::new(), CreateOptions::persistent())
            .await
            .unwrap();
        assert!(drain(&mut watch.events).is_empty());
    }

    #[tokio::test]
    async fn suspended_client_cannot_write() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        let mut watch = client.watch_tree(&p("/subs")).unwrap();

        client.suspend();
        assert!(!client.is_connected());
        assert_eq!(drain(&mut watch.events), vec![StoreEvent::ConnectionSuspended]);

        let err = client
            .create_or_set(&p("/subs/a/n"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConnectionLoss);
        assert_eq!(client.write_count(), 1);
    }

    #[tokio::test]
    async fn session_expiry_removes_ephemerals_for_everyone() {
        let ensemble = MemoryEnsemble::new();
        let owner = ensemble.connect();
        let observer = ensemble.connect();
        let mut observed = observer.watch_tree(&p("/subs")).unwrap();
        let mut own = owner.watch_tree(&p("/subs")).unwrap();

        owner
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();
        drain(&mut observed.events);
        drain(&mut own.events);

        let before = owner.session_id().unwrap();
        owner.suspend();
        owner.expire_session();

        assert_eq!(ensemble.node_count(), 0);
        let removed: Vec<_> = drain(&mut observed.events)
            .into_iter()
            .filter_map(|e| match e {
                StoreEvent::NodeRemoved { path } => Some(path.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec!["/subs/a/n-1", "/subs/a", "/subs"]);

        // The owner's own cache is stale until it reconnects.
        assert_eq!(
            drain(&mut own.events),
            vec![StoreEvent::ConnectionSuspended, StoreEvent::ConnectionLost]
        );
        assert!(own.view.current_data(&p("/subs/a/n-1")).is_some());

        owner.reconnect().unwrap();
        assert_ne!(owner.session_id().unwrap(), before);
        let events = drain(&mut own.events);
        assert_eq!(events[0], StoreEvent::ConnectionReconnected);
        assert_eq!(events.len(), 4);
        assert!(own.view.current_data(&p("/subs/a/n-1")).is_none());
    }

    #[tokio::test]
    async fn reconnect_without_expiry_keeps_session() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();
        let session = client.session_id();

        client.suspend();
        client.reconnect().unwrap();

        assert_eq!(client.session_id(), session);
        assert_eq!(ensemble.node_count(), 3);
    }

    #[tokio::test]
    async fn guaranteed_delete_applies_after_reconnect() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::persistent())
            .await
            .unwrap();

        client.suspend();
        let err = client
            .delete(&p("/subs/a/n-1"), DeleteOptions::guaranteed())
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConnectionLoss);
        assert_eq!(client.pending_delete_count(), 1);

        client
            .delete(&p("/subs/a/n-1"), DeleteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(client.pending_delete_count(), 1);

        client.reconnect().unwrap();
        assert_eq!(client.pending_delete_count(), 0);
        assert_eq!(ensemble.node_count(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client.fail_next_writes(1);
        client.fail_next_deletes(1);

        let leaf = p("/subs/a/n-1");
        assert!(matches!(
            client
                .create_or_set(&leaf, Bytes::new(), CreateOptions::ephemeral())
                .await,
            Err(Error::Unavailable { .. })
        ));
        client
            .create_or_set(&leaf, Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();
        assert!(matches!(
            client.delete(&leaf, DeleteOptions::default()).await,
            Err(Error::Unavailable { .. })
        ));
        client.delete(&leaf, DeleteOptions::default()).await.unwrap();

        assert_eq!(client.written_paths(), vec![leaf.clone(), leaf]);
        client.reset_write_log();
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn closed_client_is_rejected() {
        let ensemble = MemoryEnsemble::new();
        let client = ensemble.connect();
        client
            .create_or_set(&p("/subs/a/n-1"), Bytes::new(), CreateOptions::ephemeral())
            .await
            .unwrap();

        client.close();
        assert_eq!(client.session_id(), None);
        assert_eq!(ensemble.node_count(), 0);
        assert_eq!(client.reconnect(), Err(Error::Closed));
        assert!(matches!(
            client.watch_tree(&p("/subs")),
            Err(Error::Closed)
        ));
    }
}
