//! Three-way merge of two divergent values against their common ancestor.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::multiset::{insert_relative, remove_first, Multiset};
use crate::registry::{FieldKind, TypeRegistry};
use crate::value::{Record, Value};

static NULL: Value = Value::Null;

/// Merge `left` and `right`, both descended from `common`.
///
/// Rules, in order:
/// 1. A non-null `common` with a null `left` or `right` yields null.
/// 2. When both sides agree (and hold no counters) the agreed value wins.
/// 3. On a kind mismatch `right` wins if it changed kind, else `left`.
/// 4. Otherwise merge per kind.
pub(crate) fn merge(registry: &TypeRegistry, common: &Value, left: &Value, right: &Value) -> Value {
    if !common.is_null() && (left.is_null() || right.is_null()) {
        return Value::Null;
    }
    if left == right && !left.contains_counter() {
        return left.clone();
    }

    let common_kind = common.kind();
    let left_kind = left.kind();
    let right_kind = right.kind();
    if let (Some(c), Some(r)) = (common_kind, right_kind) {
        if c != r {
            trace!(?c, ?r, "kind changed on right");
            return right.clone();
        }
    }
    if let (Some(c), Some(l)) = (common_kind, left_kind) {
        if c != l {
            trace!(?c, ?l, "kind changed on left");
            return left.clone();
        }
    }
    // Both sides created the value concurrently with different kinds.
    if let (Some(l), Some(r)) = (left_kind, right_kind) {
        if l != r {
            return right.clone();
        }
    }

    let Some(template) = [right, common, left].into_iter().find(|v| !v.is_null()) else {
        return Value::Null;
    };
    match template {
        Value::Counter(_) => {
            let c = common.as_counter().unwrap_or(0);
            let l = left.as_counter().unwrap_or(0);
            let r = right.as_counter().unwrap_or(0);
            Value::Counter(c.wrapping_add(l.wrapping_sub(c)).wrapping_add(r.wrapping_sub(c)))
        }
        Value::Map(_) => Value::Map(merge_maps(
            registry,
            common.as_map(),
            left.as_map(),
            right.as_map(),
        )),
        Value::Set(_) => Value::Set(merge_sets(common.as_set(), left.as_set(), right.as_set())),
        Value::List(_) => Value::List(merge_lists(
            common.as_list(),
            left.as_list(),
            right.as_list(),
        )),
        Value::Record(rec) => Value::Record(merge_records(
            registry,
            &rec.type_name,
            common.as_record(),
            left.as_record(),
            right.as_record(),
        )),
        _ => {
            if right != common {
                right.clone()
            } else if left != common {
                left.clone()
            } else {
                common.clone()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

type Map = BTreeMap<String, Value>;

fn merge_maps(
    registry: &TypeRegistry,
    common: Option<&Map>,
    left: Option<&Map>,
    right: Option<&Map>,
) -> Map {
    let keys: BTreeSet<&String> = left
        .into_iter()
        .chain(right)
        .flat_map(|m| m.keys())
        .collect();

    let mut out = Map::new();
    for key in keys {
        let c = entry(common, key);
        let l = entry(left, key);
        let r = entry(right, key);
        // Removed by one side.
        if c.is_some() && (l.is_none() || r.is_none()) {
            continue;
        }
        out.insert(
            key.clone(),
            merge(
                registry,
                c.unwrap_or(&NULL),
                l.unwrap_or(&NULL),
                r.unwrap_or(&NULL),
            ),
        );
    }
    out
}

fn entry<'a>(side: Option<&'a Map>, key: &str) -> Option<&'a Value> {
    side.and_then(|m| m.get(key))
}

fn merge_sets(
    common: Option<&BTreeSet<Value>>,
    left: Option<&BTreeSet<Value>>,
    right: Option<&BTreeSet<Value>>,
) -> BTreeSet<Value> {
    let empty = BTreeSet::new();
    let left = left.unwrap_or(&empty);
    let right = right.unwrap_or(&empty);
    let Some(common) = common else {
        return left.union(right).cloned().collect();
    };

    let kept = common
        .iter()
        .filter(|v| left.contains(*v) && right.contains(*v));
    let added_left = left.iter().filter(|v| !common.contains(*v));
    let added_right = right
        .iter()
        .filter(|v| !common.contains(*v) && !left.contains(*v));
    kept.chain(added_left).chain(added_right).cloned().collect()
}

fn merge_lists(
    common: Option<&Vec<Value>>,
    left: Option<&Vec<Value>>,
    right: Option<&Vec<Value>>,
) -> Vec<Value> {
    let empty = Vec::new();
    let common = common.unwrap_or(&empty);
    let left = left.unwrap_or(&empty);
    let right = right.unwrap_or(&empty);

    let mut out = common.clone();

    // Elements novel on the left, at their relative positions.
    let mut claimed = Multiset::of(common);
    let mut inserted = Multiset::new();
    for (index, item) in left.iter().enumerate() {
        if !claimed.take(item) {
            insert_relative(&mut out, index, left.len(), item.clone());
            inserted.add(item);
        }
    }

    // Pass 1: common elements the left dropped.
    let mut survivors = Multiset::of(left);
    for item in common {
        if !survivors.take(item) {
            remove_first(&mut out, item);
        }
    }

    // Elements novel on the right and not already added from the left.
    let mut claimed = Multiset::of(common);
    for (index, item) in right.iter().enumerate() {
        if claimed.take(item) || inserted.take(item) {
            continue;
        }
        insert_relative(&mut out, index, right.len(), item.clone());
    }

    // Pass 2: common elements the right dropped.
    let mut survivors = Multiset::of(right);
    for item in common {
        if !survivors.take(item) {
            remove_first(&mut out, item);
        }
    }
    out
}

fn merge_records(
    registry: &TypeRegistry,
    type_name: &str,
    common: Option<&Record>,
    left: Option<&Record>,
    right: Option<&Record>,
) -> Record {
    let mut out = Record::new(type_name);

    for (name, kind) in record_fields(registry, type_name, [common, left, right]) {
        let c = field(common, &name);
        let l = field(left, &name);
        let r = field(right, &name);
        let merged = match (kind, c, l, r) {
            (_, None, None, None) => continue,
            (FieldKind::Transient, ..) => r.or(l).or(c).cloned().unwrap_or_default(),
            (FieldKind::Data, ..) => merge(
                registry,
                c.unwrap_or(&NULL),
                l.unwrap_or(&NULL),
                r.unwrap_or(&NULL),
            ),
        };
        out.fields.insert(name, merged);
    }
    out
}

fn field<'a>(side: Option<&'a Record>, name: &str) -> Option<&'a Value> {
    side.and_then(|r| r.get(name))
}

/// Fields to visit for a record type: the declared ones when a schema is
/// registered, otherwise every field present on any side.
pub(crate) fn record_fields<'a>(
    registry: &TypeRegistry,
    type_name: &str,
    sides: impl IntoIterator<Item = Option<&'a Record>>,
) -> Vec<(String, FieldKind)> {
    match registry.schema(type_name) {
        Some(schema) => schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.kind))
            .collect(),
        None => sides
            .into_iter()
            .flatten()
            .flat_map(|r| r.fields.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| (name.clone(), FieldKind::Data))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecordSchema;

    fn t(s: &str) -> Value {
        Value::text(s)
    }

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| t(s)).collect())
    }

    fn set(items: &[&str]) -> Value {
        Value::set_of(items.iter().map(|s| t(s)))
    }

    fn merge3(common: &Value, left: &Value, right: &Value) -> Value {
        merge(&TypeRegistry::new(), common, left, right)
    }

    // -----------------------------------------------------------------------
    // Scalars and counters
    // -----------------------------------------------------------------------

    #[test]
    fn scalar_prefers_changed_right() {
        assert_eq!(merge3(&Value::Int(1), &Value::Int(2), &Value::Int(3)), Value::Int(3));
        assert_eq!(merge3(&Value::Int(1), &Value::Int(2), &Value::Int(1)), Value::Int(2));
        assert_eq!(merge3(&Value::Int(1), &Value::Int(1), &Value::Int(1)), Value::Int(1));
    }

    #[test]
    fn counter_deltas_add_up() {
        assert_eq!(
            merge3(&Value::Counter(0), &Value::Counter(5), &Value::Counter(7)),
            Value::Counter(12)
        );
        assert_eq!(
            merge3(&Value::Counter(10), &Value::Counter(13), &Value::Counter(9)),
            Value::Counter(12)
        );
    }

    #[test]
    fn counter_equal_increments_both_count() {
        assert_eq!(
            merge3(&Value::Counter(0), &Value::Counter(5), &Value::Counter(5)),
            Value::Counter(10)
        );
    }

    #[test]
    fn counter_created_on_one_side() {
        assert_eq!(
            merge3(&Value::Null, &Value::Counter(4), &Value::Null),
            Value::Counter(4)
        );
    }

    // -----------------------------------------------------------------------
    // Null and kind rules
    // -----------------------------------------------------------------------

    #[test]
    fn delete_wins_over_edit() {
        assert_eq!(merge3(&Value::Int(1), &Value::Null, &Value::Int(9)), Value::Null);
        assert_eq!(merge3(&Value::Int(1), &Value::Int(9), &Value::Null), Value::Null);
        let map = Value::map_of([("a", Value::Int(1))]);
        assert_eq!(merge3(&map, &Value::Null, &map), Value::Null);
    }

    #[test]
    fn created_on_one_side_from_null() {
        assert_eq!(merge3(&Value::Null, &Value::Null, &t("x")), t("x"));
        assert_eq!(merge3(&Value::Null, &t("x"), &Value::Null), t("x"));
        assert_eq!(merge3(&Value::Null, &Value::Null, &Value::Null), Value::Null);
    }

    #[test]
    fn kind_mismatch_prefers_right() {
        let common = Value::Int(1);
        let left = t("left");
        let right = list(&["right"]);
        assert_eq!(merge3(&common, &left, &right), right);
    }

    #[test]
    fn kind_mismatch_falls_back_to_left() {
        let common = Value::Int(1);
        let left = t("left");
        let right = Value::Int(1);
        assert_eq!(merge3(&common, &left, &right), left);
    }

    #[test]
    fn kind_mismatch_between_new_values_prefers_right() {
        assert_eq!(merge3(&Value::Null, &t("a"), &Value::Int(2)), Value::Int(2));
    }

    #[test]
    fn record_type_change_counts_as_kind_mismatch() {
        let common = Value::Record(Record::new("v1").with("a", Value::Int(1)));
        let left = Value::Record(Record::new("v1").with("a", Value::Int(2)));
        let right = Value::Record(Record::new("v2").with("a", Value::Int(1)));
        assert_eq!(merge3(&common, &left, &right), right);
    }

    // -----------------------------------------------------------------------
    // Maps and sets
    // -----------------------------------------------------------------------

    #[test]
    fn map_keys_from_both_sides() {
        let common = Value::map_of([("a", Value::Int(1))]);
        let left = Value::map_of([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let right = Value::map_of([("a", Value::Int(1)), ("c", Value::Int(3))]);
        let expected = Value::map_of([("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]);
        assert_eq!(merge3(&common, &left, &right), expected);
    }

    #[test]
    fn map_key_removed_by_one_side_is_dropped() {
        let common = Value::map_of([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let left = Value::map_of([("a", Value::Int(1))]);
        let right = Value::map_of([("a", Value::Int(5)), ("b", Value::Int(7))]);
        assert_eq!(merge3(&common, &left, &right), Value::map_of([("a", Value::Int(5))]));
    }

    #[test]
    fn map_values_merge_recursively() {
        let common = Value::map_of([("hits", Value::Counter(1))]);
        let left = Value::map_of([("hits", Value::Counter(3))]);
        let right = Value::map_of([("hits", Value::Counter(2))]);
        assert_eq!(
            merge3(&common, &left, &right),
            Value::map_of([("hits", Value::Counter(4))])
        );
    }

    #[test]
    fn set_additions_union() {
        assert_eq!(
            merge3(&set(&["a", "b"]), &set(&["a", "b", "c"]), &set(&["a", "b", "d"])),
            set(&["a", "b", "c", "d"])
        );
    }

    #[test]
    fn set_removal_on_either_side_wins() {
        assert_eq!(
            merge3(&set(&["a", "b"]), &set(&["a"]), &set(&["a", "b", "c"])),
            set(&["a", "c"])
        );
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    #[test]
    fn list_appends_from_both_sides() {
        assert_eq!(
            merge3(&list(&["a", "b"]), &list(&["a", "b", "c"]), &list(&["a", "b", "d"])),
            list(&["a", "b", "c", "d"])
        );
    }

    #[test]
    fn list_add_on_left_only() {
        assert_eq!(
            merge3(&list(&[]), &list(&["L"]), &list(&[])),
            list(&["L"])
        );
    }

    #[test]
    fn list_element_must_survive_both_sides() {
        assert_eq!(
            merge3(&list(&["L", "R"]), &list(&["L", "R"]), &list(&["L"])),
            list(&["L"])
        );
        assert_eq!(
            merge3(&list(&["L", "R"]), &list(&["R"]), &list(&["L", "R"])),
            list(&["R"])
        );
    }

    #[test]
    fn list_left_removals_land_before_right_insertions() {
        // The right's insertion index is applied to the list the left
        // already shortened.
        assert_eq!(
            merge3(&list(&["a", "b", "c"]), &list(&["b", "c"]), &list(&["a", "X", "b", "c"])),
            list(&["b", "X", "c"])
        );
    }

    #[test]
    fn list_prepend_and_append() {
        assert_eq!(
            merge3(&list(&["b"]), &list(&["a", "b"]), &list(&["b", "c"])),
            list(&["a", "b", "c"])
        );
    }

    #[test]
    fn list_duplicates_tracked_by_count() {
        assert_eq!(
            merge3(&list(&["x"]), &list(&["x", "x"]), &list(&["x"])),
            list(&["x", "x"])
        );
        assert_eq!(
            merge3(&list(&["x", "x"]), &list(&["x"]), &list(&["x", "x"])),
            list(&["x"])
        );
    }

    #[test]
    fn list_same_addition_on_both_sides_is_not_doubled() {
        assert_eq!(
            merge3(&list(&["a"]), &list(&["a", "n"]), &list(&["a", "n", "m"])),
            list(&["a", "n", "m"])
        );
    }

    #[test]
    fn agreed_reorder_is_kept() {
        assert_eq!(
            merge3(&list(&["a", "b"]), &list(&["b", "a"]), &list(&["b", "a"])),
            list(&["b", "a"])
        );
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    fn make_registry() -> TypeRegistry {
        TypeRegistry::builder()
            .schema(
                RecordSchema::new("account")
                    .data("name")
                    .data("balance")
                    .transient("session"),
            )
            .build()
    }

    fn make_account(name: &str, balance: i64, session: &str) -> Value {
        Value::Record(
            Record::new("account")
                .with("name", t(name))
                .with("balance", Value::Counter(balance))
                .with("session", t(session)),
        )
    }

    #[test]
    fn record_fields_merge_per_kind() {
        let registry = make_registry();
        let merged = merge(
            &registry,
            &make_account("acme", 10, "s0"),
            &make_account("acme ltd", 12, "s1"),
            &make_account("acme", 15, "s2"),
        );
        assert_eq!(merged, make_account("acme ltd", 17, "s2"));
    }

    #[test]
    fn transient_field_taken_from_right_then_left() {
        let registry = make_registry();
        let common = Value::Record(Record::new("account").with("session", t("c")));
        let left = Value::Record(Record::new("account").with("session", t("l")));
        let right = Value::Record(Record::new("account").with("name", t("n")));
        let merged = merge(&registry, &common, &left, &right);
        let merged = merged.as_record().unwrap();
        assert_eq!(merged.get("session"), Some(&t("l")));
        assert_eq!(merged.get("name"), Some(&t("n")));
    }

    #[test]
    fn schemaless_record_merges_union_of_fields() {
        let common = Value::Record(Record::new("note").with("a", Value::Int(1)));
        let left = Value::Record(Record::new("note").with("a", Value::Int(1)).with("b", Value::Int(2)));
        let right = Value::Record(Record::new("note").with("a", Value::Int(3)));
        let merged = merge3(&common, &left, &right);
        assert_eq!(
            merged,
            Value::Record(Record::new("note").with("a", Value::Int(3)).with("b", Value::Int(2)))
        );
    }

    #[test]
    fn inputs_are_not_mutated() {
        let common = list(&["a"]);
        let left = list(&["a", "b"]);
        let right = list(&["c", "a"]);
        let before = (common.clone(), left.clone(), right.clone());
        let _ = merge3(&common, &left, &right);
        assert_eq!((common, left, right), before);
    }
}
