//! Record schemas and payload codecs.
//!
//! A [`TypeRegistry`] is built once at startup and shared by reference with
//! the merger and the version graphs. It answers two questions: which fields
//! of a record type take part in merging, and how a payload type's bytes
//! become a [`Value`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{MergeError, MergeResult};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

/// Whether a field takes part in merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Merged recursively.
    Data,
    /// Bookkeeping carried opaquely; never traversed by a merge.
    Transient,
}

/// One declared field of a record type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// The declared fields of a record type, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSchema {
    type_name: String,
    fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a merged field.
    pub fn data(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Data,
        });
        self
    }

    /// Declare a transient field.
    pub fn transient(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Transient,
        });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up the kind of a declared field.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }
}

// ---------------------------------------------------------------------------
// Codecs
// ---------------------------------------------------------------------------

/// Converts between a payload's wire bytes and its value tree.
pub trait PayloadCodec: Send + Sync {
    /// Decode wire bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Value, String>;

    /// Encode a value to wire bytes.
    fn encode(&self, value: &Value) -> Result<Bytes, String>;
}

/// The default codec: the tagged JSON form of [`Value`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }

    fn encode(&self, value: &Value) -> Result<Bytes, String> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| e.to_string())
    }
}

/// A codec for payloads written as plain JSON documents
/// (see [`Value::from_json`]).
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainJsonCodec;

impl PayloadCodec for PlainJsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        let json: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Ok(Value::from_json(&json))
    }

    fn encode(&self, value: &Value) -> Result<Bytes, String> {
        serde_json::to_vec(&value.to_json())
            .map(Bytes::from)
            .map_err(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Schemas and codecs, keyed by type name.
#[derive(Clone)]
pub struct TypeRegistry {
    schemas: HashMap<String, RecordSchema>,
    codecs: HashMap<String, Arc<dyn PayloadCodec>>,
    default_codec: Option<Arc<dyn PayloadCodec>>,
}

impl TypeRegistry {
    /// A registry with no schemas and the JSON codec as default.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Schema of a record type, if one was registered.
    pub fn schema(&self, type_name: &str) -> Option<&RecordSchema> {
        self.schemas.get(type_name)
    }

    /// Codec for a payload type, falling back to the default codec.
    pub fn codec(&self, payload_type: &str) -> MergeResult<&dyn PayloadCodec> {
        self.codecs
            .get(payload_type)
            .or(self.default_codec.as_ref())
            .map(|c| c.as_ref())
            .ok_or_else(|| MergeError::UnknownPayloadType(payload_type.to_string()))
    }

    /// Decode a payload of the given type.
    pub fn decode(&self, payload_type: &str, bytes: &[u8]) -> MergeResult<Value> {
        self.codec(payload_type)?
            .decode(bytes)
            .map_err(|message| MergeError::Codec {
                payload_type: payload_type.to_string(),
                message,
            })
    }

    /// Encode a value as a payload of the given type.
    pub fn encode(&self, payload_type: &str, value: &Value) -> MergeResult<Bytes> {
        self.codec(payload_type)?
            .encode(value)
            .map_err(|message| MergeError::Codec {
                payload_type: payload_type.to_string(),
                message,
            })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codecs: Vec<_> = self.codecs.keys().collect();
        codecs.sort();
        f.debug_struct("TypeRegistry")
            .field("schemas", &self.schemas.len())
            .field("codecs", &codecs)
            .field("has_default_codec", &self.default_codec.is_some())
            .finish()
    }
}

/// Builder for [`TypeRegistry`].
pub struct TypeRegistryBuilder {
    schemas: HashMap<String, RecordSchema>,
    codecs: HashMap<String, Arc<dyn PayloadCodec>>,
    default_codec: Option<Arc<dyn PayloadCodec>>,
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self {
            schemas: HashMap::new(),
            codecs: HashMap::new(),
            default_codec: Some(Arc::new(JsonCodec)),
        }
    }
}

impl TypeRegistryBuilder {
    /// Register a record schema, replacing any earlier one for the type.
    pub fn schema(mut self, schema: RecordSchema) -> Self {
        self.schemas.insert(schema.type_name.clone(), schema);
        self
    }

    /// Register a codec for one payload type.
    pub fn codec(mut self, payload_type: impl Into<String>, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codecs.insert(payload_type.into(), codec);
        self
    }

    /// Replace the fallback codec.
    pub fn default_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.default_codec = Some(codec);
        self
    }

    /// Reject payload types without an explicit codec.
    pub fn without_default_codec(mut self) -> Self {
        self.default_codec = None;
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            schemas: self.schemas,
            codecs: self.codecs,
            default_codec: self.default_codec,
        }
    }
}
