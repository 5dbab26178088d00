//! Single-fire completion handles for `put` and `remove`.

use std::fmt;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{RegistryError, Result};

type Callback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Callback signalled exactly once with the outcome of an operation.
///
/// Completing consumes the handle. A handle dropped without being completed
/// (its task was cancelled, the runtime shut down) reports
/// [`RegistryError::Closed`], so callers never wait on a signal that cannot
/// come.
pub struct Completion {
    callback: Option<Callback>,
}

impl Completion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A completion nobody is waiting for.
    pub fn noop() -> Self {
        Self { callback: None }
    }

    /// A completion paired with the receiver that observes it.
    pub fn channel() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    pub fn complete(mut self, result: Result<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    pub fn succeed(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, error: RegistryError) {
        self.complete(Err(error))
    }

    /// Wait for a completion created by [`Completion::channel`], giving up
    /// after `timeout`.
    ///
    /// Expiry maps to [`RegistryError::Timeout`]; callers should treat it as
    /// retryable, the operation may still land later.
    pub async fn wait(rx: oneshot::Receiver<Result<()>>, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RegistryError::Closed),
            Err(_) => Err(RegistryError::Timeout),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(RegistryError::Closed));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
