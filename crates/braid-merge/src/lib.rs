//! Structural merge for Braid.
//!
//! Reconciles concurrent versions of an entity without a fixed schema.
//! Every payload is viewed as a [`Value`] tree (scalars, counters, lists,
//! sets, maps and records) and merged kind by kind:
//!
//! - [`Reconciler::merge_three_way`] merges two divergent values against
//!   their common ancestor.
//! - [`Reconciler::apply_delta`] folds a single `base -> what` edit onto an
//!   accumulated value, for chains that lack a shared ancestor.
//!
//! Both are pure: inputs are borrowed, outputs are freshly built, and the
//! same inputs always give the same output. The [`TypeRegistry`] supplies
//! record schemas (which fields are merged and which are transient) and the
//! codecs that turn wire payloads into values.

mod apply;
pub mod error;
pub mod merger;
mod multiset;
pub mod payload;
pub mod registry;
mod three_way;
pub mod value;

pub use error::{MergeError, MergeResult};
pub use merger::{Reconciler, StructuralMerger};
pub use payload::Payload;
pub use registry::{
    FieldDescriptor, FieldKind, JsonCodec, PayloadCodec, PlainJsonCodec, RecordSchema,
    TypeRegistry, TypeRegistryBuilder,
};
pub use value::{Record, Value, ValueKind};
