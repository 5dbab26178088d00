//! Recovery after reconnection.
//!
//! Ephemeral leaves die with the session that wrote them. When the client
//! comes back, possibly under a new session, every entry in the ledger is
//! written again. Writes go out concurrently and the run waits for all of
//! them. Failures are reported but not rolled back or retried; the next
//! reconnection (or an explicit [`SubsRegistry::recover`]) tries again.
//!
//! A registration removed while its replay was in flight is no longer in the
//! ledger once the write lands. The replayed leaf is then deleted again so a
//! confirmed removal stays removed.
//!
//! [`SubsRegistry::recover`]: crate::SubsRegistry::recover

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::engine::Inner;
use crate::error::{RegistryError, Result};
use crate::paths;
use crate::record::RegistrationInfo;

/// One registration that could not be written again.
#[derive(Debug, Clone)]
pub struct RecoveryFailure {
    pub address: String,
    pub registration: RegistrationInfo,
    pub error: RegistryError,
}

/// Outcome of one recovery run.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Ledger entries at the start of the run.
    pub attempted: usize,
    pub succeeded: usize,
    /// Entries removed during the run whose replayed leaf was deleted again.
    pub withdrawn: usize,
    pub failures: Vec<RecoveryFailure>,
}

impl RecoveryReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Replay {
    Restored,
    Withdrawn,
}

async fn replay(inner: &Inner, address: &str, record: &RegistrationInfo) -> Result<Replay> {
    inner.write_leaf(address, record).await?;
    if inner.ledger.contains(address, record) {
        return Ok(Replay::Restored);
    }
    let path = paths::leaf_path(&inner.root, address, record)?;
    inner.delete_leaf(&path).await?;
    debug!(node_id = %inner.node_id, address, registration = %record, "replayed registration removed meanwhile, withdrawn");
    Ok(Replay::Withdrawn)
}

/// Write every ledger entry again and publish the report.
pub(crate) async fn run(inner: Arc<Inner>) -> RecoveryReport {
    let entries = inner.ledger.entries();
    let mut report = RecoveryReport {
        attempted: entries.len(),
        ..Default::default()
    };

    let writes: Vec<_> = entries
        .into_iter()
        .map(|(address, record)| {
            let task_inner = Arc::clone(&inner);
            let handle = inner.runtime.spawn({
                let address = address.clone();
                let record = record.clone();
                async move { replay(&task_inner, &address, &record).await }
            });
            (address, record, handle)
        })
        .collect();

    for (address, registration, handle) in writes {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(RegistryError::Runtime {
                message: e.to_string(),
            }),
        };
        match outcome {
            Ok(Replay::Restored) => report.succeeded += 1,
            Ok(Replay::Withdrawn) => report.withdrawn += 1,
            Err(error) => report.failures.push(RecoveryFailure {
                address,
                registration,
                error,
            }),
        }
    }

    if report.is_success() {
        info!(
            node_id = %inner.node_id,
            registrations = report.succeeded,
            withdrawn = report.withdrawn,
            "registrations restored after reconnection"
        );
    } else {
        for failure in &report.failures {
            error!(
                node_id = %inner.node_id,
                address = %failure.address,
                registration = %failure.registration,
                error = %failure.error,
                "failed to restore registration"
            );
        }
        error!(
            node_id = %inner.node_id,
            attempted = report.attempted,
            failed = report.failures.len(),
            "recovery after reconnection incomplete"
        );
    }

    inner.recovery_tx.send_replace(Some(report.clone()));
    report
}
