//! The registry engine.
//!
//! `SubsRegistry` splits registrations between the process-local cache and
//! ephemeral leaves in the coordination store, merges both on `get`, and
//! keeps a ledger of its own leaves so they can be written again after the
//! store forgets them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use subreg_coord::{
    CoordinationClient, CreateOptions, DeleteOptions, StorePath, TreeView, WriteOutcome,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::codec::RegistrationCodec;
use crate::completion::Completion;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::executor::{Executor, Inline};
use crate::ledger::OwnLedger;
use crate::listener;
use crate::local::LocalCache;
use crate::paths;
use crate::record::RegistrationInfo;
use crate::recovery::{self, RecoveryReport};
use crate::sink::RegistrationSink;

/// State shared by the engine, the listener task, and in-flight writes.
pub(crate) struct Inner {
    pub(crate) node_id: String,
    pub(crate) root: StorePath,
    pub(crate) client: Arc<dyn CoordinationClient>,
    pub(crate) view: Arc<dyn TreeView>,
    pub(crate) codec: Arc<dyn RegistrationCodec>,
    pub(crate) sink: Arc<dyn RegistrationSink>,
    pub(crate) local: LocalCache,
    pub(crate) ledger: OwnLedger,
    pub(crate) context: Arc<dyn Executor>,
    pub(crate) dispatcher: Arc<dyn Executor>,
    pub(crate) runtime: Handle,
    pub(crate) closed: AtomicBool,
    pub(crate) recovery_tx: watch::Sender<Option<RecoveryReport>>,
}

impl Inner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(RegistryError::Closed)
        } else {
            Ok(())
        }
    }

    /// Deliver a completion on the caller's context.
    fn finish(&self, completion: Completion, result: Result<()>) {
        self.context
            .execute(Box::new(move || completion.complete(result)));
    }

    /// Local entries first, then every decodable leaf under the address.
    pub(crate) fn get(&self, address: &str) -> Result<Vec<RegistrationInfo>> {
        self.check_open()?;
        let address_node = paths::address_path(&self.root, address)?;
        let remote = self.view.current_children(&address_node).unwrap_or_default();

        let mut registrations = self
            .local
            .snapshot(address, remote.len())
            .unwrap_or_else(|| Vec::with_capacity(remote.len()));
        for (leaf, data) in remote {
            let record = self.codec.decode(&data).map_err(|e| {
                trace!(address, leaf = %leaf, error = %e, "undecodable registration leaf");
                e
            })?;
            registrations.push(record);
        }
        Ok(registrations)
    }

    /// Recompute `address` and hand it to the sink.
    ///
    /// A failed merge is reported as an empty list; stale data is worse than
    /// none.
    pub(crate) fn publish(&self, address: &str) {
        let registrations = match self.get(address) {
            Ok(registrations) => registrations,
            Err(e) => {
                debug!(node_id = %self.node_id, address, error = %e, "failed to read registrations");
                Vec::new()
            }
        };
        self.sink.registrations_updated(address, registrations);
    }

    /// Create or overwrite the leaf for `record`. Does not touch the ledger.
    pub(crate) async fn write_leaf(
        &self,
        address: &str,
        record: &RegistrationInfo,
    ) -> Result<WriteOutcome> {
        let path = paths::leaf_path(&self.root, address, record)?;
        let data = self.codec.encode(record)?;
        let outcome = self
            .client
            .create_or_set(&path, data, CreateOptions::ephemeral())
            .await?;
        Ok(outcome)
    }

    pub(crate) async fn delete_leaf(&self, path: &StorePath) -> Result<()> {
        match self.client.delete(path, DeleteOptions::guaranteed()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_no_node() => {
                debug!(%path, "registration leaf already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Distributed subscription registry for one node.
///
/// Created with [`RegistryBuilder`]. Dropping or closing the registry stops
/// its listener; leaves it wrote stay until the store session ends.
pub struct SubsRegistry {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SubsRegistry {
    pub fn builder<C, S>(client: C, sink: S) -> RegistryBuilder
    where
        C: CoordinationClient + 'static,
        S: RegistrationSink + 'static,
    {
        RegistryBuilder::new(client, sink)
    }

    /// Add `record` under `address`.
    ///
    /// A local-only record is cached and the sink sees the new list before
    /// this call returns. A cluster-wide record is written to the store in
    /// the background; the sink hears about it when the store's own
    /// notification arrives.
    ///
    /// `completion` fires exactly once, on the configured context, with the
    /// outcome. Misuse (bad address or record, closed registry) fails it
    /// before this call returns.
    pub fn put(&self, address: &str, record: RegistrationInfo, completion: Completion) {
        let inner = &self.inner;
        if let Err(e) = inner
            .check_open()
            .and_then(|_| paths::validate_address(address))
            .and_then(|_| record.validate())
        {
            completion.fail(e);
            return;
        }

        if record.is_local_only() {
            inner.local.add(address, record);
            inner.publish(address);
            inner.finish(completion, Ok(()));
            return;
        }

        let task_inner = Arc::clone(inner);
        let address = address.to_string();
        inner.runtime.spawn(async move {
            let inner = task_inner;
            match inner.write_leaf(&address, &record).await {
                Ok(outcome) => {
                    debug!(node_id = %inner.node_id, %address, registration = %record, ?outcome, "registration written");
                    inner.ledger.record(&address, record);
                    inner.finish(completion, Ok(()));
                }
                Err(e) => {
                    error!(node_id = %inner.node_id, %address, registration = %record, error = %e, "failed to write registration");
                    inner.finish(completion, Err(e));
                }
            }
        });
    }

    /// Remove `record` from `address`.
    ///
    /// Mirrors [`put`](Self::put). A cluster-wide removal issues a
    /// guaranteed delete; a leaf that is already gone counts as removed.
    ///
    /// A removal that fails (for example while the store is unreachable)
    /// leaves the registration in the ledger, and the recovery that follows
    /// the next reconnection writes it back even if the store applied the
    /// queued delete in between. Callers that still want it gone must call
    /// `remove` again once reconnected.
    pub fn remove(&self, address: &str, record: RegistrationInfo, completion: Completion) {
        let inner = &self.inner;
        if let Err(e) = inner.check_open() {
            completion.fail(e);
            return;
        }

        if record.is_local_only() {
            if let Err(e) = paths::validate_address(address) {
                completion.fail(e);
                return;
            }
            inner.local.remove(address, &record);
            inner.publish(address);
            inner.finish(completion, Ok(()));
            return;
        }

        let path = match paths::leaf_path(&inner.root, address, &record) {
            Ok(path) => path,
            Err(e) => {
                completion.fail(e);
                return;
            }
        };

        let task_inner = Arc::clone(inner);
        let address = address.to_string();
        inner.runtime.spawn(async move {
            let inner = task_inner;
            // Forgotten before the delete is issued, so a concurrent recovery
            // that replays this record sees it gone and withdraws its write.
            let tracked = inner.ledger.forget(&address, &record);
            match inner.delete_leaf(&path).await {
                Ok(()) => {
                    debug!(node_id = %inner.node_id, %address, registration = %record, "registration deleted");
                    inner.finish(completion, Ok(()));
                }
                Err(e) => {
                    error!(node_id = %inner.node_id, %address, registration = %record, error = %e, "failed to delete registration");
                    if tracked {
                        inner.ledger.record(&address, record);
                    }
                    inner.finish(completion, Err(e));
                }
            }
        });
    }

    /// [`put`](Self::put), awaiting the completion.
    pub async fn put_async(&self, address: &str, record: RegistrationInfo) -> Result<()> {
        let (completion, rx) = Completion::channel();
        self.put(address, record, completion);
        rx.await.unwrap_or(Err(RegistryError::Closed))
    }

    /// [`remove`](Self::remove), awaiting the completion.
    pub async fn remove_async(&self, address: &str, record: RegistrationInfo) -> Result<()> {
        let (completion, rx) = Completion::channel();
        self.remove(address, record, completion);
        rx.await.unwrap_or(Err(RegistryError::Closed))
    }

    /// Current registrations for `address`: local entries, then remote ones.
    ///
    /// Reads only the local cache and the store's materialized view; never
    /// waits on the network. An address nobody registered yields an empty
    /// list.
    pub fn get(&self, address: &str) -> Result<Vec<RegistrationInfo>> {
        self.inner.get(address)
    }

    /// Write every ledger entry to the store again.
    ///
    /// Runs automatically after each reconnection; call it to retry after a
    /// partially failed recovery.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        self.inner.check_open()?;
        Ok(recovery::run(Arc::clone(&self.inner)).await)
    }

    /// The outcome of the latest recovery run, `None` before the first.
    pub fn recovery_reports(&self) -> watch::Receiver<Option<RecoveryReport>> {
        self.inner.recovery_tx.subscribe()
    }

    /// Feed an event through the change listener.
    pub fn handle_event(&self, event: subreg_coord::StoreEvent) {
        listener::handle(&self.inner, event);
    }

    /// Stop the listener and reject further operations.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        debug!(node_id = %self.inner.node_id, "registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn root(&self) -> &StorePath {
        &self.inner.root
    }

    /// Cluster-wide registrations this node currently tracks.
    pub fn ledger_snapshot(&self) -> Vec<(String, RegistrationInfo)> {
        self.inner.ledger.entries()
    }

    /// Local-only registrations.
    pub fn local_snapshot(&self) -> Vec<(String, RegistrationInfo)> {
        self.inner.local.entries()
    }
}

impl Drop for SubsRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SubsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsRegistry")
            .field("node_id", &self.inner.node_id)
            .field("root", &self.inner.root)
            .field("codec", &self.inner.codec.name())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`SubsRegistry`].
///
/// # Example
///
/// ```rust
/// use subreg::{RegistryBuilder, RegistryConfig, RegistrationInfo};
/// use subreg_coord::MemoryEnsemble;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let ensemble = MemoryEnsemble::new();
/// let registry = RegistryBuilder::new(ensemble.connect(), |_: &str, _: Vec<RegistrationInfo>| {})
///     .config(RegistryConfig::with_node_id("node-a"))
///     .build()
///     .unwrap();
///
/// let record = RegistrationInfo::cluster("node-a", 1, "handler").unwrap();
/// registry.put_async("svc.foo", record).await.unwrap();
/// # });
/// ```
pub struct RegistryBuilder {
    client: Arc<dyn CoordinationClient>,
    sink: Arc<dyn RegistrationSink>,
    config: RegistryConfig,
    codec: Option<Arc<dyn RegistrationCodec>>,
    context: Option<Arc<dyn Executor>>,
    dispatcher: Option<Arc<dyn Executor>>,
    runtime: Option<Handle>,
}

impl RegistryBuilder {
    pub fn new<C, S>(client: C, sink: S) -> Self
    where
        C: CoordinationClient + 'static,
        S: RegistrationSink + 'static,
    {
        Self {
            client: Arc::new(client),
            sink: Arc::new(sink),
            config: RegistryConfig::default(),
            codec: None,
            context: None,
            dispatcher: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the codec named in the config.
    pub fn codec<T: RegistrationCodec + 'static>(mut self, codec: T) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Context that put/remove completions are delivered on.
    ///
    /// Default: [`Inline`], on whichever task finished the store call.
    pub fn context<E: Executor + 'static>(mut self, context: E) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Executor for notification-driven sink calls. Overrides the config's
    /// dispatch mode.
    pub fn dispatcher<E: Executor + 'static>(mut self, dispatcher: E) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Runtime for store calls and the listener. Default: the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Register the tree watch and start listening.
    pub fn build(self) -> Result<SubsRegistry> {
        self.config.validate()?;
        let root = self.config.root_path()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| RegistryError::Runtime {
                message: e.to_string(),
            })?,
        };

        let codec = self.codec.unwrap_or_else(|| self.config.codec.build());
        let context = self.context.unwrap_or_else(|| Arc::new(Inline));
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| self.config.dispatch.build(&runtime));

        let watch = self.client.watch_tree(&root)?;
        let (recovery_tx, _) = watch::channel(None);

        let inner = Arc::new(Inner {
            node_id: self.config.node_id,
            root,
            client: self.client,
            view: watch.view,
            codec,
            sink: self.sink,
            local: LocalCache::new(),
            ledger: OwnLedger::new(),
            context,
            dispatcher,
            runtime: runtime.clone(),
            closed: AtomicBool::new(false),
            recovery_tx,
        });

        let listener = runtime.spawn(listener::run(Arc::clone(&inner), watch.events));
        debug!(
            node_id = %inner.node_id,
            root = %inner.root,
            codec = inner.codec.name(),
            dispatcher = inner.dispatcher.name(),
            "registry started"
        );

        Ok(SubsRegistry {
            inner,
            listener: Mutex::new(Some(listener)),
        })
    }
}
