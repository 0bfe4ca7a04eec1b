//! The authorization oracle consumed by the merge coordinator.

use std::sync::Arc;

use braid_types::{EntityId, PartitionKey, Principal};

/// Decides whether a principal may write a version of an entity.
pub trait WriteAuthority: Send + Sync {
    fn can_write(&self, principal: &Principal, partition: &PartitionKey, entity: &EntityId) -> bool;
}

impl<T: WriteAuthority + ?Sized> WriteAuthority for Arc<T> {
    fn can_write(&self, principal: &Principal, partition: &PartitionKey, entity: &EntityId) -> bool {
        (**self).can_write(principal, partition, entity)
    }
}

/// Allows every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl WriteAuthority for AllowAll {
    fn can_write(&self, _: &Principal, _: &PartitionKey, _: &EntityId) -> bool {
        true
    }
}

/// Denies every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAll;

impl WriteAuthority for DenyAll {
    fn can_write(&self, _: &Principal, _: &PartitionKey, _: &EntityId) -> bool {
        false
    }
}
