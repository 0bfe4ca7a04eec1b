//! Two-way apply: fold one `base -> what` edit onto an accumulated value.

use std::collections::{BTreeMap, BTreeSet};

use crate::multiset::{insert_relative, remove_first, Multiset};
use crate::registry::{FieldKind, TypeRegistry};
use crate::three_way::record_fields;
use crate::value::{Record, Value};

static NULL: Value = Value::Null;

/// Apply the edit that turned `base` into `what` onto `existing`.
///
/// A null `base` means `what` is an addition; a null `what` means `base`
/// was deleted. A `base` of a different kind than `what` is treated as
/// absent, and an `existing` of a different kind is replaced.
pub(crate) fn apply(registry: &TypeRegistry, base: &Value, what: &Value, existing: &Value) -> Value {
    if what.is_null() {
        return remove(base, existing);
    }
    let base = if base.kind() == what.kind() { base } else { &NULL };
    if existing.kind() != what.kind() {
        return what.clone();
    }

    match what {
        Value::Counter(w) => {
            let b = base.as_counter().unwrap_or(0);
            let e = existing.as_counter().unwrap_or(0);
            Value::Counter(e.wrapping_add(w.wrapping_sub(b)))
        }
        Value::Map(w) => Value::Map(apply_map(registry, base.as_map(), w, existing.as_map())),
        Value::Set(w) => Value::Set(apply_set(base.as_set(), w, existing.as_set())),
        Value::List(w) => Value::List(apply_list(base.as_list(), w, existing.as_list())),
        Value::Record(w) => Value::Record(apply_record(registry, base.as_record(), w, existing.as_record())),
        _ => {
            if base.is_null() || base == what {
                existing.clone()
            } else {
                what.clone()
            }
        }
    }
}

/// Delete what `base` held from `existing`: containers lose the matching
/// entries, anything else becomes null.
fn remove(base: &Value, existing: &Value) -> Value {
    match (base, existing) {
        (Value::Null, _) => existing.clone(),
        (Value::Map(b), Value::Map(e)) => Value::Map(
            e.iter()
                .filter(|(k, _)| !b.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        (Value::Set(b), Value::Set(e)) => Value::Set(e.difference(b).cloned().collect()),
        (Value::List(b), Value::List(e)) => {
            let mut out = e.clone();
            for item in b {
                remove_first(&mut out, item);
            }
            Value::List(out)
        }
        _ => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

type Map = BTreeMap<String, Value>;

fn apply_map(registry: &TypeRegistry, base: Option<&Map>, what: &Map, existing: Option<&Map>) -> Map {
    let mut out = existing.cloned().unwrap_or_default();

    let Some(base) = base else {
        for (key, w) in what {
            let merged = match out.get(key) {
                Some(e) => apply(registry, &NULL, w, e),
                None => w.clone(),
            };
            out.insert(key.clone(), merged);
        }
        return out;
    };

    for key in base.keys() {
        if !what.contains_key(key) {
            out.remove(key);
        }
    }
    for (key, w) in what {
        let b = base.get(key);
        if b == Some(w) {
            continue;
        }
        let merged = apply(
            registry,
            b.unwrap_or(&NULL),
            w,
            out.get(key).unwrap_or(&NULL),
        );
        out.insert(key.clone(), merged);
    }
    out
}

fn apply_set(
    base: Option<&BTreeSet<Value>>,
    what: &BTreeSet<Value>,
    existing: Option<&BTreeSet<Value>>,
) -> BTreeSet<Value> {
    let mut out = existing.cloned().unwrap_or_default();
    match base {
        Some(base) => {
            for removed in base.difference(what) {
                out.remove(removed);
            }
            out.extend(what.difference(base).cloned());
        }
        None => out.extend(what.iter().cloned()),
    }
    out
}

fn apply_list(base: Option<&Vec<Value>>, what: &[Value], existing: Option<&Vec<Value>>) -> Vec<Value> {
    let mut out = existing.cloned().unwrap_or_default();
    let Some(base) = base else {
        let snapshot = out.clone();
        let mut present = Multiset::of(&snapshot);
        for (index, item) in what.iter().enumerate() {
            if !present.take(item) {
                insert_relative(&mut out, index, what.len(), item.clone());
            }
        }
        return out;
    };

    let mut survivors = Multiset::of(what);
    for item in base {
        if !survivors.take(item) {
            remove_first(&mut out, item);
        }
    }
    let mut previous = Multiset::of(base);
    for (index, item) in what.iter().enumerate() {
        if !previous.take(item) {
            insert_relative(&mut out, index, what.len(), item.clone());
        }
    }
    out
}

fn apply_record(
    registry: &TypeRegistry,
    base: Option<&Record>,
    what: &Record,
    existing: Option<&Record>,
) -> Record {
    let mut out = existing
        .cloned()
        .unwrap_or_else(|| Record::new(what.type_name.clone()));

    for (name, kind) in record_fields(registry, &what.type_name, [base, Some(what), existing]) {
        let b = base.and_then(|r| r.get(&name));
        let w = what.get(&name);
        match (kind, w) {
            (FieldKind::Transient, Some(w)) => {
                out.fields.insert(name, w.clone());
            }
            (FieldKind::Transient, None) => {}
            (FieldKind::Data, None) => {
                if b.is_some() {
                    out.fields.remove(&name);
                }
            }
            (FieldKind::Data, Some(w)) => {
                if b == Some(w) {
                    continue;
                }
                let merged = apply(
                    registry,
                    b.unwrap_or(&NULL),
                    w,
                    out.fields.get(&name).unwrap_or(&NULL),
                );
                out.fields.insert(name, merged);
            }
        }
    }
    out
}
