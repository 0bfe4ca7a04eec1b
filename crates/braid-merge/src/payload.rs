//! Two-state payload representation.

use bytes::Bytes;

use crate::error::MergeResult;
use crate::registry::TypeRegistry;
use crate::value::Value;

/// A version's payload, either still in wire form or already decoded.
///
/// Nothing is cached behind the caller's back: decoding happens when
/// [`Payload::materialize`] is called, and a caller that wants to keep the
/// decoded form swaps in the result of [`Payload::into_materialized`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Raw bytes as read from the log.
    Wire(Bytes),
    /// Structured value.
    Materialized(Value),
}

impl Payload {
    /// The structured value, decoding wire bytes with the registry's codec.
    pub fn materialize(&self, registry: &TypeRegistry, payload_type: &str) -> MergeResult<Value> {
        match self {
            Self::Wire(bytes) => registry.decode(payload_type, bytes),
            Self::Materialized(value) => Ok(value.clone()),
        }
    }

    /// Convert to the materialized state, consuming the wire form.
    pub fn into_materialized(self, registry: &TypeRegistry, payload_type: &str) -> MergeResult<Self> {
        match self {
            Self::Wire(bytes) => registry.decode(payload_type, &bytes).map(Self::Materialized),
            materialized => Ok(materialized),
        }
    }

    /// Wire bytes, encoding a materialized value with the registry's codec.
    pub fn to_wire(&self, registry: &TypeRegistry, payload_type: &str) -> MergeResult<Bytes> {
        match self {
            Self::Wire(bytes) => Ok(bytes.clone()),
            Self::Materialized(value) => registry.encode(payload_type, value),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized(_))
    }

    /// The decoded value, if already materialized.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Materialized(value) => Some(value),
            Self::Wire(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Materialized(value)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Wire(bytes)
    }
}
