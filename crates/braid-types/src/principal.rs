use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::partition::PartitionKey;

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Where a write grant applies.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantScope {
    /// Every partition and entity.
    Global,
    /// Every entity on one partition.
    Partition(PartitionKey),
    /// A single entity on one partition.
    Entity(PartitionKey, EntityId),
}

impl GrantScope {
    /// Returns `true` if this scope covers the given entity.
    pub fn covers(&self, partition: &PartitionKey, entity: &EntityId) -> bool {
        match self {
            Self::Global => true,
            Self::Partition(p) => p == partition,
            Self::Entity(p, e) => p == partition && e == entity,
        }
    }
}

/// Permission to write versions within a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteGrant {
    pub scope: GrantScope,
    /// Expiry in UNIX milliseconds; `None` never expires.
    pub expires_at_ms: Option<u64>,
}

impl WriteGrant {
    /// A grant with no expiry.
    pub fn new(scope: GrantScope) -> Self {
        Self {
            scope,
            expires_at_ms: None,
        }
    }

    /// Same grant, expiring at the given UNIX millisecond.
    pub fn expiring_at(mut self, expires_at_ms: u64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    /// Returns `true` if the grant has expired at the given time.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map(|exp| now_ms > exp).unwrap_or(false)
    }
}

/// An acting identity together with the write grants it holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub grants: Vec<WriteGrant>,
}

impl Principal {
    /// A principal holding no grants.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grants: Vec::new(),
        }
    }

    /// Add a grant.
    pub fn with_grant(mut self, grant: WriteGrant) -> Self {
        self.grants.push(grant);
        self
    }

    /// Returns `true` if an unexpired grant covers the entity.
    pub fn holds_grant_for(&self, partition: &PartitionKey, entity: &EntityId, now_ms: u64) -> bool {
        self.grants
            .iter()
            .any(|g| !g.is_expired_at(now_ms) && g.scope.covers(partition, entity))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
