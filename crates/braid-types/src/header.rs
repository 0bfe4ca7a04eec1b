//! Version record headers.
//!
//! A [`VersionHeader`] carries everything the version graph needs to place a
//! record: which entity it belongs to, its own version id, and the versions
//! it descends from. The payload itself travels separately.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, VersionId};

/// Header of one version of an entity.
///
/// `previous_version` is the single primary parent. `merges` lists the
/// additional parents of a reconciliation version. A header with
/// `has_payload == false` is a tombstone (logical delete).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHeader {
    /// The entity this version belongs to.
    pub id: EntityId,
    /// This version's identifier.
    pub version: VersionId,
    /// Primary parent, absent for the first version of an entity.
    pub previous_version: Option<VersionId>,
    /// Additional parents folded in by a merge commit.
    pub merges: BTreeSet<VersionId>,
    /// Name of the payload type, used to pick a decoder.
    pub payload_type: String,
    /// `false` for tombstones.
    pub has_payload: bool,
    /// Position of the record in its partition, stamped by the log.
    pub partition_offset: u64,
}

impl VersionHeader {
    /// Header for the first version of an entity.
    pub fn root(id: EntityId, payload_type: impl Into<String>) -> Self {
        Self {
            id,
            version: VersionId::new(),
            previous_version: None,
            merges: BTreeSet::new(),
            payload_type: payload_type.into(),
            has_payload: true,
            partition_offset: 0,
        }
    }

    /// Header for a successor of `previous` on the same entity.
    pub fn successor(previous: &VersionHeader) -> Self {
        Self {
            id: previous.id,
            version: VersionId::new(),
            previous_version: Some(previous.version),
            merges: BTreeSet::new(),
            payload_type: previous.payload_type.clone(),
            has_payload: true,
            partition_offset: 0,
        }
    }

    /// Use an explicit version id instead of a generated one.
    pub fn with_version(mut self, version: VersionId) -> Self {
        self.version = version;
        self
    }

    /// Set the primary parent.
    pub fn with_previous(mut self, previous: Option<VersionId>) -> Self {
        self.previous_version = previous;
        self
    }

    /// Set the additional merge parents.
    pub fn with_merges(mut self, merges: impl IntoIterator<Item = VersionId>) -> Self {
        self.merges = merges.into_iter().collect();
        self
    }

    /// Turn this header into a tombstone.
    pub fn into_tombstone(mut self) -> Self {
        self.has_payload = false;
        self
    }

    /// Returns `true` if this version carries no payload.
    pub fn is_tombstone(&self) -> bool {
        !self.has_payload
    }

    /// Returns `true` if this version reconciles more than one parent.
    pub fn is_merge(&self) -> bool {
        !self.merges.is_empty()
    }

    /// All parents: the primary parent first, then the merge parents.
    pub fn parents(&self) -> impl Iterator<Item = VersionId> + '_ {
        self.previous_version
            .iter()
            .copied()
            .chain(self.merges.iter().copied())
    }
}
