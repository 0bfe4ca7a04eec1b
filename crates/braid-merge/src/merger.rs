//! The reconciliation seam used by the version graph.

use std::sync::Arc;

use crate::apply;
use crate::registry::TypeRegistry;
use crate::three_way;
use crate::value::Value;

/// Reconciles divergent values.
///
/// Implementations must be pure and deterministic: the same inputs always
/// produce the same output, and inputs are never mutated.
pub trait Reconciler: Send + Sync {
    /// Merge two values that diverged from `common`.
    fn merge_three_way(&self, common: &Value, left: &Value, right: &Value) -> Value;

    /// Fold the edit `base -> what` onto `existing`.
    fn apply_delta(&self, base: &Value, what: &Value, existing: &Value) -> Value;

    /// Replay an ordered chain of `(base, what)` edits, starting from an
    /// empty accumulator.
    fn apply_chain<'a, I>(&self, edits: I) -> Value
    where
        I: IntoIterator<Item = (&'a Value, &'a Value)>,
        Self: Sized,
    {
        edits
            .into_iter()
            .fold(Value::Null, |acc, (base, what)| self.apply_delta(base, what, &acc))
    }
}

/// Structural merge over the [`Value`] tree, guided by a [`TypeRegistry`].
#[derive(Clone, Debug, Default)]
pub struct StructuralMerger {
    registry: Arc<TypeRegistry>,
}

impl StructuralMerger {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
}

impl Reconciler for StructuralMerger {
    fn merge_three_way(&self, common: &Value, left: &Value, right: &Value) -> Value {
        three_way::merge(&self.registry, common, left, right)
    }

    fn apply_delta(&self, base: &Value, what: &Value, existing: &Value) -> Value {
        apply::apply(&self.registry, base, what, existing)
    }
}
