//! Counted element tracking for list merges.

use std::collections::HashMap;

use crate::value::Value;

/// Borrowed multiset of values: duplicates are tracked by count.
#[derive(Debug, Default)]
pub(crate) struct Multiset<'a> {
    counts: HashMap<&'a Value, usize>,
}

impl<'a> Multiset<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn of(items: &'a [Value]) -> Self {
        let mut set = Self::new();
        for item in items {
            set.add(item);
        }
        set
    }

    pub(crate) fn add(&mut self, item: &'a Value) {
        *self.counts.entry(item).or_insert(0) += 1;
    }

    /// Consume one occurrence; returns `false` if none were left.
    pub(crate) fn take(&mut self, item: &Value) -> bool {
        match self.counts.get_mut(item) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Insert `item`, which sat at `index` of a list of `len` elements, at the
/// same relative position in `out`: the last element is appended, the first
/// is prepended, anything else keeps its index when `out` is long enough.
pub(crate) fn insert_relative(out: &mut Vec<Value>, index: usize, len: usize, item: Value) {
    if index + 1 == len {
        out.push(item);
    } else if index == 0 {
        out.insert(0, item);
    } else if index < out.len() {
        out.insert(index, item);
    } else {
        out.push(item);
    }
}

/// Remove the first occurrence of `item` from `out`.
pub(crate) fn remove_first(out: &mut Vec<Value>, item: &Value) {
    if let Some(pos) = out.iter().position(|v| v == item) {
        out.remove(pos);
    }
}
