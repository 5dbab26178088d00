//! Local-only registrations.

use crate::record::RegistrationInfo;
use crate::set_map::RegistrationSetMap;

/// Registrations visible only inside this process.
///
/// Never written to the store. An address disappears from the cache as soon
/// as its last registration is removed.
#[derive(Debug, Default)]
pub struct LocalCache {
    sets: RegistrationSetMap,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the registration was already cached.
    pub fn add(&self, address: &str, record: RegistrationInfo) -> bool {
        debug_assert!(record.is_local_only());
        self.sets.add(address, record)
    }

    /// Returns `false` if the registration was not cached.
    pub fn remove(&self, address: &str, record: &RegistrationInfo) -> bool {
        self.sets.remove(address, record)
    }

    /// Local registrations for `address`, with room for `extra` more.
    pub fn snapshot(&self, address: &str, extra: usize) -> Option<Vec<RegistrationInfo>> {
        self.sets.snapshot(address, extra)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.sets.contains_address(address)
    }

    pub fn entries(&self) -> Vec<(String, RegistrationInfo)> {
        self.sets.entries()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
