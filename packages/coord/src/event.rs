//! Notifications delivered by a tree watch.

use bytes::Bytes;

use crate::StorePath;

/// A change observed by a tree watch.
///
/// Node events carry the absolute path of the node that changed; connectivity
/// events carry nothing. Consumers are expected to `match` exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A node appeared under the watched root.
    NodeAdded { path: StorePath, data: Bytes },
    /// The data of a watched node was written.
    NodeUpdated { path: StorePath, data: Bytes },
    /// A watched node disappeared.
    NodeRemoved { path: StorePath },
    /// The connection is interrupted; the session may still be alive.
    ConnectionSuspended,
    /// The session is gone; its ephemeral nodes have been removed.
    ConnectionLost,
    /// The client is connected again, possibly under a new session.
    ConnectionReconnected,
}

impl StoreEvent {
    /// Path of the node this event is about, for node events.
    pub fn path(&self) -> Option<&StorePath> {
        match self {
            StoreEvent::NodeAdded { path, .. }
            | StoreEvent::NodeUpdated { path, .. }
            | StoreEvent::NodeRemoved { path } => Some(path),
            StoreEvent::ConnectionSuspended
            | StoreEvent::ConnectionLost
            | StoreEvent::ConnectionReconnected => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::NodeAdded { .. } => "node_added",
            StoreEvent::NodeUpdated { .. } => "node_updated",
            StoreEvent::NodeRemoved { .. } => "node_removed",
            StoreEvent::ConnectionSuspended => "connection_suspended",
            StoreEvent::ConnectionLost => "connection_lost",
            StoreEvent::ConnectionReconnected => "connection_reconnected",
        }
    }
}
