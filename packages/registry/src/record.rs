//! Registration records.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// One subscriber's interest in an address.
///
/// Identity is the `(node_id, seq)` pair: two records with the same pair are
/// the same registration even if their payloads differ. Records are
/// immutable; changing one means removing it and putting a new one.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistrationInfo {
    node_id: String,
    seq: u64,
    local_only: bool,
    payload: Bytes,
}

impl RegistrationInfo {
    /// Create a record, validating the node id.
    ///
    /// The node id becomes part of a store leaf name, so it must be
    /// non-empty and free of `/` and NUL.
    pub fn new(
        node_id: impl Into<String>,
        seq: u64,
        local_only: bool,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let record = Self {
            node_id: node_id.into(),
            seq,
            local_only,
            payload: payload.into(),
        };
        record.validate()?;
        Ok(record)
    }

    /// A cluster-wide record.
    pub fn cluster(node_id: impl Into<String>, seq: u64, payload: impl Into<Bytes>) -> Result<Self> {
        Self::new(node_id, seq, false, payload)
    }

    /// A record visible only inside this process.
    pub fn local(node_id: impl Into<String>, seq: u64, payload: impl Into<Bytes>) -> Result<Self> {
        Self::new(node_id, seq, true, payload)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(RegistryError::InvalidRegistration {
                message: "node id is empty".to_string(),
            });
        }
        if self.node_id.contains(['/', '\0']) {
            return Err(RegistryError::InvalidRegistration {
                message: format!("node id '{}' contains '/' or NUL", self.node_id.escape_debug()),
            });
        }
        Ok(())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl PartialEq for RegistrationInfo {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.node_id == other.node_id
    }
}

impl Eq for RegistrationInfo {}

impl Hash for RegistrationInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
        self.seq.hash(state);
    }
}

impl fmt::Debug for RegistrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationInfo")
            .field("node_id", &self.node_id)
            .field("seq", &self.seq)
            .field("local_only", &self.local_only)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for RegistrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.node_id, self.seq)?;
        if self.local_only {
            write!(f, " (local)")?;
        }
        Ok(())
    }
}
