//! Store layout of the registry.
//!
//! ```text
//! <root>                      e.g. /__vertx.subs
//! <root>/<address>            one container per address
//! <root>/<address>/<node>-<seq>   one ephemeral leaf per cluster-wide registration
//! ```
//!
//! The layout is shared with every other node reading the same store, so
//! these functions must not change their output.

use subreg_coord::StorePath;

use crate::error::{RegistryError, Result};
use crate::record::RegistrationInfo;

/// Well-known root of the registry subtree.
pub const DEFAULT_ROOT: &str = "/__vertx.subs";

/// Check that `address` can be used as a single path component.
pub fn validate_address(address: &str) -> Result<()> {
    StorePath::validate_component(address, 0).map_err(|e| invalid_address(address, e))
}

fn invalid_address(address: &str, error: subreg_coord::PathError) -> RegistryError {
    let message = match error {
        subreg_coord::PathError::InvalidComponent { message, .. } => message,
        subreg_coord::PathError::InvalidPath { message } => message,
    };
    RegistryError::InvalidAddress {
        address: address.to_string(),
        message,
    }
}

/// `<root>/<address>`
pub fn address_path(root: &StorePath, address: &str) -> Result<StorePath> {
    root.child(address).map_err(|e| invalid_address(address, e))
}

/// `<node_id>-<seq>`
pub fn leaf_name(record: &RegistrationInfo) -> String {
    format!("{}-{}", record.node_id(), record.seq())
}

/// `<root>/<address>/<node_id>-<seq>`
pub fn leaf_path(root: &StorePath, address: &str, record: &RegistrationInfo) -> Result<StorePath> {
    let address_node = address_path(root, address)?;
    address_node
        .child(&leaf_name(record))
        .map_err(|e| RegistryError::InvalidRegistration {
            message: e.to_string(),
        })
}

/// What a notification path refers to, relative to the registry root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// The root itself.
    Root,
    /// An address node with no leaf segment.
    Address(String),
    /// A registration leaf (or something below one) under `address`.
    Leaf { address: String, leaf: String },
    /// Not under the root at all.
    Outside,
}

impl NotificationTarget {
    /// The address whose registrations may have changed.
    ///
    /// Only leaf notifications carry one; root and address-node changes say
    /// nothing about a registration.
    pub fn changed_address(&self) -> Option<&str> {
        match self {
            NotificationTarget::Leaf { address, .. } => Some(address),
            NotificationTarget::Root
            | NotificationTarget::Address(_)
            | NotificationTarget::Outside => None,
        }
    }
}

/// Resolve a notification path against the registry root.
pub fn classify(root: &StorePath, path: &StorePath) -> NotificationTarget {
    let Some(relative) = path.strip_prefix(root) else {
        return NotificationTarget::Outside;
    };
    match relative.components.as_slice() {
        [] => NotificationTarget::Root,
        [address] => NotificationTarget::Address(address.clone()),
        [address, leaf, ..] => NotificationTarget::Leaf {
            address: address.clone(),
            leaf: leaf.clone(),
        },
    }
}
