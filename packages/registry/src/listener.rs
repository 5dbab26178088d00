//! Change listener: turns store events into sink calls.

use std::sync::Arc;

use subreg_coord::StoreEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::engine::Inner;
use crate::paths::{self, NotificationTarget};
use crate::recovery;

/// Drain the watch until it closes or the registry does.
pub(crate) async fn run(inner: Arc<Inner>, mut events: mpsc::UnboundedReceiver<StoreEvent>) {
    while let Some(event) = events.recv().await {
        if inner.is_closed() {
            break;
        }
        handle(&inner, event);
    }
    debug!(node_id = %inner.node_id, "change listener stopped");
}

/// React to one event. Never mutates the local cache or the ledger.
pub(crate) fn handle(inner: &Arc<Inner>, event: StoreEvent) {
    match event {
        StoreEvent::NodeAdded { path, .. }
        | StoreEvent::NodeUpdated { path, .. }
        | StoreEvent::NodeRemoved { path } => {
            let target = paths::classify(&inner.root, &path);
            match target.changed_address() {
                Some(address) => dispatch(inner, address.to_string()),
                None if target == NotificationTarget::Outside => {
                    trace!(%path, "notification outside registry root");
                }
                None => trace!(%path, "no registration under notification path"),
            }
        }
        StoreEvent::ConnectionSuspended => {
            warn!(node_id = %inner.node_id, "connection to coordination store suspended");
        }
        StoreEvent::ConnectionLost => {
            warn!(node_id = %inner.node_id, "connection to coordination store lost");
        }
        StoreEvent::ConnectionReconnected => {
            info!(node_id = %inner.node_id, "reconnected to coordination store, re-registering");
            if inner.is_closed() {
                return;
            }
            inner.runtime.spawn(recovery::run(Arc::clone(inner)));
        }
    }
}

fn dispatch(inner: &Arc<Inner>, address: String) {
    let task_inner = Arc::clone(inner);
    inner
        .dispatcher
        .execute(Box::new(move || task_inner.publish(&address)));
}
