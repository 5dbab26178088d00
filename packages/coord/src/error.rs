//! Error types for coordination store operations.

use thiserror::Error;

use crate::path::{PathError, StorePath};

/// Errors reported by a coordination store client.
///
/// Errors are `Clone` so that test doubles can hand the same failure to
/// several callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Path validation error.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// The node (or a required parent) does not exist.
    #[error("no node at {path}")]
    NoNode { path: StorePath },

    /// The node still has children and cannot be deleted.
    #[error("node at {path} has children")]
    NotEmpty { path: StorePath },

    /// The client is not connected to the store.
    #[error("connection to coordination store lost")]
    ConnectionLoss,

    /// The store refused or failed the operation.
    #[error("coordination store unavailable: {message}")]
    Unavailable { message: String },

    /// The client or watch has been closed.
    #[error("coordination client closed")]
    Closed,
}

impl Error {
    /// Whether the failure is a missing node.
    pub fn is_no_node(&self) -> bool {
        matches!(self, Error::NoNode { .. })
    }
}

/// Result type alias for coordination store operations.
pub type Result<T> = std::result::Result<T, Error>;
