//! Concurrent address → registration-set map.
//!
//! Both the local cache and the own-registrations ledger are one of these.
//! Mutations run under the map shard's write lock, so an add and a remove on
//! the same address cannot interleave, and an empty set is dropped in the
//! same step that empties it. Addresses in different shards never contend.
//!
//! Each set also carries its own lock so a reader can copy it without
//! holding the shard.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::record::RegistrationInfo;

type SharedSet = Arc<Mutex<IndexSet<RegistrationInfo>>>;

/// Address → insertion-ordered set of registrations. Empty sets never persist.
#[derive(Default)]
pub struct RegistrationSetMap {
    sets: DashMap<String, SharedSet>,
}

impl RegistrationSetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `record` under `address`.
    ///
    /// Returns `false` if an equal record was already present; the stored
    /// record is left as it was.
    pub fn add(&self, address: &str, record: RegistrationInfo) -> bool {
        let set = self.sets.entry(address.to_string()).or_default();
        let inserted = set.lock().insert(record);
        inserted
    }

    /// Add `record` under `address`, overwriting an equal record in place.
    ///
    /// Returns the record it displaced, if any.
    pub fn replace(&self, address: &str, record: RegistrationInfo) -> Option<RegistrationInfo> {
        let set = self.sets.entry(address.to_string()).or_default();
        let displaced = set.lock().replace(record);
        displaced
    }

    /// Remove `record` from `address`, dropping the address once empty.
    ///
    /// Returns `false` if the record was not present.
    pub fn remove(&self, address: &str, record: &RegistrationInfo) -> bool {
        match self.sets.entry(address.to_string()) {
            Entry::Occupied(entry) => {
                let (removed, now_empty) = {
                    let mut set = entry.get().lock();
                    let removed = set.shift_remove(record);
                    (removed, set.is_empty())
                };
                if now_empty {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Copy of the set for `address`, or `None` if the address is absent.
    ///
    /// `extra` reserves room for entries the caller will append.
    pub fn snapshot(&self, address: &str, extra: usize) -> Option<Vec<RegistrationInfo>> {
        let set = self.sets.get(address).map(|entry| Arc::clone(entry.value()))?;
        let set = set.lock();
        let mut out = Vec::with_capacity(set.len() + extra);
        out.extend(set.iter().cloned());
        Some(out)
    }

    pub fn contains(&self, address: &str, record: &RegistrationInfo) -> bool {
        self.sets
            .get(address)
            .map(|entry| entry.value().lock().contains(record))
            .unwrap_or(false)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.sets.contains_key(address)
    }

    /// Every `(address, record)` pair, address by address.
    pub fn entries(&self) -> Vec<(String, RegistrationInfo)> {
        let sets: Vec<(String, SharedSet)> = self
            .sets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut out = Vec::new();
        for (address, set) in sets {
            out.extend(set.lock().iter().map(|r| (address.clone(), r.clone())));
        }
        out
    }

    /// Number of addresses with at least one registration.
    pub fn address_count(&self) -> usize {
        self.sets.len()
    }

    /// Total number of registrations across all addresses.
    pub fn len(&self) -> usize {
        self.sets.iter().map(|entry| entry.value().lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl std::fmt::Debug for RegistrationSetMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationSetMap")
            .field("addresses", &self.address_count())
            .finish()
    }
}
