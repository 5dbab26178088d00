//! Execution contexts for callbacks.
//!
//! Store writes complete on whatever task the client resolves them on. A
//! host with single-writer semantics (an event loop, an actor) needs its
//! completions and sink calls delivered back onto its own context, so the
//! registry posts them through an [`Executor`] instead of calling them
//! directly.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::error;

/// A unit of work posted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run callbacks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn execute(&self, task: Task) {
        self.as_ref().execute(task)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) {
        task()
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Runs each task as its own tokio task. No ordering between tasks.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Runs each task on tokio's blocking pool, for sinks that may block.
#[derive(Debug, Clone)]
pub struct BlockingExecutor {
    handle: Handle,
}

impl BlockingExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Executor for BlockingExecutor {
    fn execute(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

/// Runs tasks one at a time, in the order they were posted.
///
/// A panicking task is logged and does not stop the queue.
#[derive(Debug, Clone)]
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<Task>,
}

impl SerialExecutor {
    /// Start the queue's worker on `handle`.
    ///
    /// The worker exits once every clone of the executor is dropped.
    pub fn new(handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("serial executor task panicked");
                }
            }
        });
        Self { tx }
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) {
        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            // Worker gone with the runtime; run here rather than drop.
            task()
        }
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

/// How notification-driven sink calls are dispatched, as named in
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the listener task itself.
    Inline,
    /// On one FIFO worker, preserving notification order.
    #[default]
    Serial,
    /// On the blocking pool.
    Blocking,
}

impl DispatchMode {
    /// Parse a configuration value; unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "inline" => Some(DispatchMode::Inline),
            "serial" => Some(DispatchMode::Serial),
            "blocking" => Some(DispatchMode::Blocking),
            _ => None,
        }
    }

    pub fn build(self, handle: &Handle) -> Arc<dyn Executor> {
        match self {
            DispatchMode::Inline => Arc::new(Inline),
            DispatchMode::Serial => Arc::new(SerialExecutor::new(handle)),
            DispatchMode::Blocking => Arc::new(BlockingExecutor::new(handle.clone())),
        }
    }
}
