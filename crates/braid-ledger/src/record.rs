//! The wire shape of a version record.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use braid_dag::VersionNode;
use braid_merge::{Payload, TypeRegistry};
use braid_types::VersionHeader;

use crate::error::LogError;

/// A version record as it travels through the log: the header plus an
/// opaque payload blob whose decoding is keyed by `header.payload_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub header: VersionHeader,
    /// `None` for tombstones.
    pub payload: Option<Bytes>,
}

impl VersionRecord {
    pub fn new(header: VersionHeader, payload: Bytes) -> Self {
        Self {
            header,
            payload: Some(payload),
        }
    }

    /// A tombstone record.
    pub fn tombstone(header: VersionHeader) -> Self {
        Self {
            header: header.into_tombstone(),
            payload: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.header.is_tombstone() || self.payload.is_none()
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogError> {
        bincode::serialize(self).map_err(|e| LogError::Serialization(e.to_string()))
    }

    /// Decode a bincode frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        bincode::deserialize(bytes).map_err(|e| LogError::Serialization(e.to_string()))
    }

    /// The graph node for this record; the payload stays in wire form.
    pub fn to_node(&self) -> VersionNode {
        let payload = match (&self.payload, self.header.has_payload) {
            (Some(bytes), true) => Some(Payload::Wire(bytes.clone())),
            _ => None,
        };
        VersionNode::new(self.header.clone(), payload)
    }

    /// The graph node with its payload decoded up front.
    pub fn to_materialized_node(&self, registry: &TypeRegistry) -> Result<VersionNode, LogError> {
        Ok(self.to_node().into_materialized(registry)?)
    }
}
