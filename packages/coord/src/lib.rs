//! Coordination Store Contract
//!
//! The pieces a registry needs from a hierarchical coordination service
//! with sessions and ephemeral nodes:
//! - `StorePath`: Validated slash-separated node path
//! - `CoordinationClient`: Create-or-set, delete, and subtree watches
//! - `TreeView`: Locally cached reads of a watched subtree
//! - `StoreEvent`: Node changes and connectivity transitions
//! - `MemoryEnsemble`: An in-process store with controllable sessions
//!
//! # Example
//!
//! ```rust
//! use subreg_coord::{CoordinationClient, DeleteOptions, StorePath};
//!
//! async fn drop_leaf(client: &dyn CoordinationClient) -> subreg_coord::Result<()> {
//!     let leaf = StorePath::parse("/__vertx.subs/news/node-a-1")?;
//!     client.delete(&leaf, DeleteOptions::guaranteed()).await
//! }
//! ```

pub use bytes::Bytes;

mod error;
mod event;
pub mod memory;
mod path;
mod path_trie;
mod traits;
mod tree_cache;

pub use error::{Error, Result};
pub use event::StoreEvent;
pub use memory::{MemoryClient, MemoryEnsemble, SessionId};
pub use path::{PathError, StorePath};
pub use path_trie::{PathTrie, PathTrieIter};
pub use traits::{
    CoordinationClient, CreateMode, CreateOptions, DeleteOptions, TreeView, TreeWatch,
    WriteOutcome,
};
pub use tree_cache::TreeCache;
