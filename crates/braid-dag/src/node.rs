//! Version nodes: one received record each.

use braid_merge::{MergeResult, Payload, TypeRegistry, Value};
use braid_types::{EntityId, VersionHeader, VersionId};

/// A received version record plus its payload.
///
/// Nodes are immutable once added to a graph. The receipt offset is the
/// header's `partition_offset`, stamped by the log.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionNode {
    pub header: VersionHeader,
    /// `None` for tombstones.
    pub payload: Option<Payload>,
}

impl VersionNode {
    pub fn new(header: VersionHeader, payload: Option<Payload>) -> Self {
        Self { header, payload }
    }

    /// A node carrying an already decoded value.
    pub fn with_value(header: VersionHeader, value: Value) -> Self {
        Self::new(header, Some(Payload::Materialized(value)))
    }

    /// A tombstone node.
    pub fn tombstone(header: VersionHeader) -> Self {
        Self::new(header.into_tombstone(), None)
    }

    pub fn entity(&self) -> EntityId {
        self.header.id
    }

    pub fn version(&self) -> VersionId {
        self.header.version
    }

    pub fn offset(&self) -> u64 {
        self.header.partition_offset
    }

    /// Returns `true` if the node carries no payload.
    pub fn is_tombstone(&self) -> bool {
        self.header.is_tombstone() || self.payload.is_none()
    }

    /// Replace a wire payload with its decoded value.
    pub fn into_materialized(self, registry: &TypeRegistry) -> MergeResult<Self> {
        let payload = match self.payload {
            Some(payload) if self.header.has_payload => {
                Some(payload.into_materialized(registry, &self.header.payload_type)?)
            }
            other => other,
        };
        Ok(Self {
            header: self.header,
            payload,
        })
    }

    /// The node's value; tombstones read as [`Value::Null`].
    pub fn value(&self, registry: &TypeRegistry) -> MergeResult<Value> {
        match &self.payload {
            Some(payload) if self.header.has_payload => {
                payload.materialize(registry, &self.header.payload_type)
            }
            _ => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_reads_as_null() {
        let header = VersionHeader::root(EntityId::new(), "doc");
        let node = VersionNode::tombstone(header);
        assert!(node.is_tombstone());
        assert!(node.header.is_tombstone());
        assert_eq!(node.value(&TypeRegistry::new()).unwrap(), Value::Null);
    }

    #[test]
    fn missing_payload_is_a_tombstone() {
        let header = VersionHeader::root(EntityId::new(), "doc");
        let node = VersionNode::new(header, None);
        assert!(node.is_tombstone());
    }

    #[test]
    fn wire_payload_decodes() {
        let registry = TypeRegistry::new();
        let value = Value::Counter(3);
        let bytes = registry.encode("doc", &value).unwrap();
        let node = VersionNode::new(
            VersionHeader::root(EntityId::new(), "doc"),
            Some(Payload::Wire(bytes)),
        );
        assert_eq!(node.value(&registry).unwrap(), value);
    }

    #[test]
    fn materializing_decodes_the_wire_payload() {
        let registry = TypeRegistry::new();
        let value = Value::map_of([("n", Value::Int(4))]);
        let bytes = registry.encode("doc", &value).unwrap();
        let node = VersionNode::new(
            VersionHeader::root(EntityId::new(), "doc"),
            Some(Payload::Wire(bytes)),
        )
        .into_materialized(&registry)
        .unwrap();
        assert_eq!(node.payload, Some(Payload::Materialized(value)));

        let tombstone = VersionNode::tombstone(VersionHeader::root(EntityId::new(), "doc"))
            .into_materialized(&registry)
            .unwrap();
        assert!(tombstone.payload.is_none());
    }

    #[test]
    fn accessors_read_header() {
        let mut header = VersionHeader::root(EntityId::from_u128(1), "doc")
            .with_version(VersionId::from_u128(2));
        header.partition_offset = 17;
        let node = VersionNode::with_value(header, Value::Int(1));
        assert_eq!(node.entity(), EntityId::from_u128(1));
        assert_eq!(node.version(), VersionId::from_u128(2));
        assert_eq!(node.offset(), 17);
        assert!(!node.is_tombstone());
    }
}
