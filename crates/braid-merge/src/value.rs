//! The tagged value tree every merge operates on.
//!
//! Typed records are converted to a [`Value`] at the boundary (through a
//! [`PayloadCodec`](crate::registry::PayloadCodec) or [`Value::from_json`])
//! so the merge algorithms never need to introspect concrete Rust types.
//!
//! `Value` has a total order and a hash that agree with its equality, which
//! lets values sit inside sets, act as multiset keys for list merges, and be
//! compared for the scalar "did this side change" checks. Floats compare by
//! [`f64::total_cmp`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A structured value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent, deleted, or tombstoned.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    /// Additive counter: concurrent deltas are summed, never overwritten.
    Counter(i64),
    /// Ordered list; duplicates are allowed and tracked by count.
    List(Vec<Value>),
    /// Unordered set.
    Set(BTreeSet<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Nested record with a declared type.
    Record(Record),
}

/// A named record: the tree form of a typed struct.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// An empty record of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// The shape of a non-null value. Two values merge structurally only when
/// their kinds agree; records additionally compare their type names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind<'a> {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Uuid,
    Counter,
    List,
    Set,
    Map,
    Record(&'a str),
}

impl Value {
    /// The kind of this value, or `None` for [`Value::Null`].
    pub fn kind(&self) -> Option<ValueKind<'_>> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Counter(_) => ValueKind::Counter,
            Self::List(_) => ValueKind::List,
            Self::Set(_) => ValueKind::Set,
            Self::Map(_) => ValueKind::Map,
            Self::Record(r) => ValueKind::Record(&r.type_name),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for lists, sets, maps and records.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Map(_) | Self::Record(_)
        )
    }

    /// Returns `true` if this value or anything nested in it is a counter.
    pub fn contains_counter(&self) -> bool {
        match self {
            Self::Counter(_) => true,
            Self::List(items) => items.iter().any(Value::contains_counter),
            Self::Set(items) => items.iter().any(Value::contains_counter),
            Self::Map(entries) => entries.values().any(Value::contains_counter),
            Self::Record(r) => r.fields.values().any(Value::contains_counter),
            _ => false,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            Self::Counter(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Convenience constructor for text.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Build a set from any iterator of values.
    pub fn set_of(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    /// Build a map from `(key, value)` pairs.
    pub fn map_of<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Position of the variant in the total order.
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Text(_) => 4,
            Self::Bytes(_) => 5,
            Self::Uuid(_) => 6,
            Self::Counter(_) => 7,
            Self::List(_) => 8,
            Self::Set(_) => 9,
            Self::Map(_) => 10,
            Self::Record(_) => 11,
        }
    }

    // ---------------------------------------------------------------
    // Plain JSON boundary
    // ---------------------------------------------------------------

    /// Convert plain JSON into a value.
    ///
    /// Objects become maps, arrays become lists, integral numbers become
    /// `Int`. A few marker objects select the kinds plain JSON cannot
    /// express: `{"$counter": n}`, `{"$set": [...]}`, `{"$uuid": "..."}`,
    /// `{"$bytes": [...]}`, and any object with a `"$type"` string, which
    /// becomes a record of that type holding the remaining keys.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Self::Text(s.clone()),
            J::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            J::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(marked) = Self::from_marker(obj) {
                        return marked;
                    }
                }
                if let Some(J::String(type_name)) = obj.get("$type") {
                    let fields = obj
                        .iter()
                        .filter(|(k, _)| k.as_str() != "$type")
                        .map(|(k, v)| (k.clone(), Self::from_json(v)))
                        .collect();
                    return Self::Record(Record {
                        type_name: type_name.clone(),
                        fields,
                    });
                }
                Self::Map(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Self::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    fn from_marker(obj: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        use serde_json::Value as J;
        let (key, inner) = obj.iter().next()?;
        match (key.as_str(), inner) {
            ("$counter", J::Number(n)) => n.as_i64().map(Self::Counter),
            ("$set", J::Array(items)) => Some(Self::Set(items.iter().map(Self::from_json).collect())),
            ("$uuid", J::String(s)) => uuid::Uuid::parse_str(s).ok().map(Self::Uuid),
            ("$bytes", J::Array(items)) => items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Self::Bytes),
            _ => None,
        }
    }

    /// Convert back to plain JSON, using the same markers as [`Self::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Null => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => J::String(s.clone()),
            Self::Bytes(b) => json!({ "$bytes": b }),
            Self::Uuid(u) => json!({ "$uuid": u.to_string() }),
            Self::Counter(n) => json!({ "$counter": n }),
            Self::List(items) => J::Array(items.iter().map(Self::to_json).collect()),
            Self::Set(items) => json!({ "$set": items.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Map(entries) => J::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Record(r) => {
                let mut obj: serde_json::Map<String, J> = r
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                obj.insert("$type".into(), J::String(r.type_name.clone()));
                J::Object(obj)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Counter(a), Self::Counter(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (Self::Set(a), Self::Set(b)) => a.cmp(b),
            (Self::Map(a), Self::Map(b)) => a.cmp(b),
            (Self::Record(a), Self::Record(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Uuid(u) => u.hash(state),
            Self::Counter(n) => n.hash(state),
            Self::List(items) => items.hash(state),
            Self::Set(items) => items.hash(state),
            Self::Map(entries) => entries.hash(state),
            Self::Record(r) => r.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_kind() {
        assert!(Value::Null.kind().is_none());
        assert_eq!(Value::Int(1).kind(), Some(ValueKind::Int));
    }

    #[test]
    fn counter_and_int_are_different_kinds() {
        assert_ne!(Value::Int(1).kind(), Value::Counter(1).kind());
    }

    #[test]
    fn record_kind_includes_type_name() {
        let a = Value::Record(Record::new("account"));
        let b = Value::Record(Record::new("invoice"));
        assert_ne!(a.kind(), b.kind());
        assert_eq!(a.kind(), Value::Record(Record::new("account")).kind());
    }

    #[test]
    fn floats_compare_totally() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert!(Value::Float(1.0) < Value::Float(2.0));
    }

    #[test]
    fn cross_kind_ordering_follows_rank() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Int(i64::MAX) < Value::Float(f64::MIN));
        assert!(Value::Text("z".into()) < Value::List(vec![]));
    }

    #[test]
    fn values_work_as_set_members() {
        let set = Value::set_of([Value::from("a"), Value::from("b"), Value::from("a")]);
        assert_eq!(set.as_set().unwrap().len(), 2);
    }

    #[test]
    fn contains_counter_looks_through_containers() {
        let nested = Value::map_of([("hits", Value::List(vec![Value::Counter(3)]))]);
        assert!(nested.contains_counter());
        assert!(!Value::map_of([("a", Value::Int(1))]).contains_counter());
    }

    #[test]
    fn from_json_plain_shapes() {
        let value = Value::from_json(&json!({"a": 1, "b": [true, "x"], "c": 1.5, "d": null}));
        let map = value.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::List(vec![Value::Bool(true), Value::from("x")]));
        assert_eq!(map["c"], Value::Float(1.5));
        assert_eq!(map["d"], Value::Null);
    }

    #[test]
    fn from_json_markers() {
        assert_eq!(Value::from_json(&json!({"$counter": 4})), Value::Counter(4));
        assert_eq!(
            Value::from_json(&json!({"$set": ["a", "b"]})),
            Value::set_of([Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            Value::from_json(&json!({"$bytes": [1, 2]})),
            Value::Bytes(vec![1, 2])
        );
        let record = Value::from_json(&json!({"$type": "account", "name": "acme"}));
        let record = record.as_record().unwrap();
        assert_eq!(record.type_name, "account");
        assert_eq!(record.get("name"), Some(&Value::from("acme")));
        assert!(record.get("$type").is_none());
    }

    #[test]
    fn unknown_marker_stays_a_map() {
        let value = Value::from_json(&json!({"$other": 1}));
        assert!(value.as_map().is_some());
    }

    #[test]
    fn json_boundary_roundtrip() {
        let value = Value::Record(
            Record::new("account")
                .with("balance", Value::Counter(10))
                .with("tags", Value::set_of([Value::from("vip")]))
                .with("owner", Value::Uuid(uuid::Uuid::from_u128(5)))
                .with("notes", Value::List(vec![Value::from("a"), Value::Float(0.5)])),
        );
        assert_eq!(Value::from_json(&value.to_json()), value);
    }

    #[test]
    fn serde_tagged_roundtrip() {
        let value = Value::map_of([("n", Value::Counter(2)), ("s", Value::set_of([Value::Int(1)]))]);
        let json = serde_json::to_string(&value).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, parsed);
    }
}
