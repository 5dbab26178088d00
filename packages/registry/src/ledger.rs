//! Own-registrations ledger.

use crate::record::RegistrationInfo;
use crate::set_map::RegistrationSetMap;

/// Cluster-wide registrations this node has successfully written.
///
/// The ledger records intent, not truth: reads never consult it. It exists
/// so the node can publish its registrations again after a session loss
/// wipes its ephemeral leaves.
#[derive(Debug, Default)]
pub struct OwnLedger {
    sets: RegistrationSetMap,
}

impl OwnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a confirmed write. A later write of the same registration
    /// replaces the earlier one, so replay restores the newest payload.
    ///
    /// Returns `true` if the registration was not tracked before.
    pub fn record(&self, address: &str, record: RegistrationInfo) -> bool {
        self.sets.replace(address, record).is_none()
    }

    /// Forget a confirmed delete.
    pub fn forget(&self, address: &str, record: &RegistrationInfo) -> bool {
        self.sets.remove(address, record)
    }

    pub fn contains(&self, address: &str, record: &RegistrationInfo) -> bool {
        self.sets.contains(address, record)
    }

    /// Point-in-time copy of every tracked `(address, record)` pair.
    pub fn entries(&self) -> Vec<(String, RegistrationInfo)> {
        self.sets.entries()
    }

    pub fn address_count(&self) -> usize {
        self.sets.address_count()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
