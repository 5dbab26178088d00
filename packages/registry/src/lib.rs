//! Distributed Subscription Registry
//!
//! Lets every node of a cluster publish, per address, the endpoints
//! interested in it, and discover everyone else's:
//! - Local-only registrations stay in this process (`LocalCache`)
//! - Cluster-wide registrations become ephemeral leaves in a coordination
//!   store, so a node's registrations vanish with its session
//! - `get` merges both without a network round trip
//! - Store notifications are turned into `RegistrationSink` calls
//! - After a reconnection the node writes its own registrations again from
//!   its ledger (`OwnLedger`)
//!
//! # Example
//!
//! ```rust
//! use subreg::{ChannelSink, RegistrationInfo, RegistryBuilder, RegistryConfig};
//! use subreg_coord::MemoryEnsemble;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ensemble = MemoryEnsemble::new();
//! let (sink, _updates) = ChannelSink::new();
//! let registry = RegistryBuilder::new(ensemble.connect(), sink)
//!     .config(RegistryConfig::with_node_id("node-a"))
//!     .build()?;
//!
//! let local = RegistrationInfo::local("node-a", 1, "inbox")?;
//! registry.put_async("svc.bar", local.clone()).await?;
//! assert_eq!(registry.get("svc.bar")?, vec![local]);
//! # Ok::<(), subreg::RegistryError>(())
//! # }).unwrap();
//! ```

mod codec;
mod completion;
mod config;
mod engine;
mod error;
mod executor;
mod ledger;
mod listener;
mod local;
pub mod paths;
mod record;
mod recovery;
mod set_map;
mod sink;

pub use codec::{BinaryCodec, CodecKind, JsonCodec, RegistrationCodec};
pub use completion::Completion;
pub use config::RegistryConfig;
pub use engine::{RegistryBuilder, SubsRegistry};
pub use error::{RegistryError, Result};
pub use executor::{
    BlockingExecutor, DispatchMode, Executor, Inline, SerialExecutor, Task, TokioExecutor,
};
pub use ledger::OwnLedger;
pub use local::LocalCache;
pub use record::RegistrationInfo;
pub use recovery::{RecoveryFailure, RecoveryReport};
pub use set_map::RegistrationSetMap;
pub use sink::{ChannelSink, RegistrationSink, RegistrationUpdate};
