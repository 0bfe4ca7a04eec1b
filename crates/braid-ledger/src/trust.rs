//! Chain-of-trust boundary.
//!
//! Records are validated before they reach a version graph. Signature and
//! key checks live outside Braid; a [`TrustValidator`] is the seam where
//! they plug in.

use std::collections::HashSet;

use braid_types::PartitionKey;

use crate::record::VersionRecord;

/// Accepts or rejects a record before it is indexed.
pub trait TrustValidator: Send + Sync {
    /// `Err(reason)` rejects the record.
    fn validate(&self, partition: &PartitionKey, record: &VersionRecord) -> Result<(), String>;
}

/// Trusts every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl TrustValidator for AcceptAll {
    fn validate(&self, _: &PartitionKey, _: &VersionRecord) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts only records whose payload type is on an allow-list.
#[derive(Clone, Debug, Default)]
pub struct PayloadTypeAllowList {
    allowed: HashSet<String>,
}

impl PayloadTypeAllowList {
    pub fn new<S: Into<String>>(allowed: impl IntoIterator<Item = S>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl TrustValidator for PayloadTypeAllowList {
    fn validate(&self, _: &PartitionKey, record: &VersionRecord) -> Result<(), String> {
        if self.allowed.contains(&record.header.payload_type) {
            Ok(())
        } else {
            Err(format!("payload type '{}' is not allowed", record.header.payload_type))
        }
    }
}
