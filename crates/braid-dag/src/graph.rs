//! The per-entity version graph.
//!
//! [`VersionGraph`] indexes every received version of one entity by version
//! id and maintains the derived **leaf set**: the versions no held node names
//! as a parent. More than one leaf means the entity has forked and a merge
//! is required.
//!
//! # Invariants
//!
//! - At least one leaf exists once any node has been added.
//! - Adding a child of a leaf replaces that leaf; adding a sibling of a
//!   non-leaf parent grows the leaf set by one.
//! - A merge node replaces every leaf it names with itself.
//! - A version already referenced as a parent never becomes a leaf, even
//!   when it arrives after its child.
//!
//! Writes happen on the partition's single consumption path; readers take
//! snapshots of the leaf set and never hold the lock while merging.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use braid_merge::{Reconciler, TypeRegistry, Value};
use braid_types::{EntityId, VersionHeader, VersionId};

use crate::error::{DagError, DagResult};
use crate::node::VersionNode;

/// Default bound on how far `previous_version` chains are walked when
/// looking for a common ancestor.
pub const DEFAULT_SEARCH_DEPTH: usize = 64;

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<VersionId, Arc<VersionNode>>,
    /// Current leaves, in insertion order.
    leaves: Vec<VersionId>,
    /// Every version named as a parent by a held node.
    referenced: HashSet<VersionId>,
    /// Receipt offsets in arrival order.
    history: Vec<u64>,
    last: Option<VersionId>,
}

/// Version DAG of a single entity.
#[derive(Debug)]
pub struct VersionGraph {
    entity: EntityId,
    search_depth: usize,
    state: RwLock<GraphState>,
}

impl VersionGraph {
    /// Create an empty graph for an entity.
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            search_depth: DEFAULT_SEARCH_DEPTH,
            state: RwLock::new(GraphState::default()),
        }
    }

    /// Override the common-ancestor search depth.
    pub fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Insert a node and update the leaf set.
    ///
    /// Returns `Ok(false)` if the version is already known, so redelivery
    /// of a record is harmless.
    pub fn add(&self, node: VersionNode) -> DagResult<bool> {
        if node.entity() != self.entity {
            return Err(DagError::EntityMismatch {
                expected: self.entity,
                found: node.entity(),
            });
        }

        let version = node.version();
        let mut state = self.write();
        if state.nodes.contains_key(&version) {
            return Ok(false);
        }

        for parent in node.header.parents() {
            state.referenced.insert(parent);
            state.leaves.retain(|leaf| *leaf != parent);
        }
        if !state.referenced.contains(&version) {
            state.leaves.push(version);
        }
        state.history.push(node.offset());
        state.last = Some(version);

        debug!(
            entity = %self.entity.short_id(),
            version = %version.short_id(),
            offset = node.offset(),
            merge = node.header.is_merge(),
            leaves = state.leaves.len(),
            "added version node"
        );
        state.nodes.insert(version, Arc::new(node));
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Snapshot of the current leaves, in insertion order.
    pub fn leaves(&self) -> Vec<Arc<VersionNode>> {
        let state = self.read();
        state
            .leaves
            .iter()
            .filter_map(|v| state.nodes.get(v).cloned())
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.read().leaves.len()
    }

    /// Returns `true` if the entity has forked.
    pub fn requires_merge(&self) -> bool {
        self.leaf_count() > 1
    }

    /// The leaf with the highest receipt offset; ties go to the later leaf.
    pub fn most_recent_by_offset(&self) -> Option<Arc<VersionNode>> {
        self.leaves().into_iter().max_by_key(|node| node.offset())
    }

    /// Returns `true` if the most recently received leaf carries a payload.
    pub fn has_payload(&self) -> bool {
        self.most_recent_by_offset()
            .map(|node| !node.is_tombstone())
            .unwrap_or(false)
    }

    pub fn get(&self, version: &VersionId) -> Option<Arc<VersionNode>> {
        self.read().nodes.get(version).cloned()
    }

    pub fn contains(&self, version: &VersionId) -> bool {
        self.read().nodes.contains_key(version)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    /// Receipt offsets of every node, in arrival order.
    pub fn history(&self) -> Vec<u64> {
        self.read().history.clone()
    }

    pub fn first_offset(&self) -> Option<u64> {
        self.read().history.first().copied()
    }

    pub fn last_offset(&self) -> Option<u64> {
        self.read().history.last().copied()
    }

    /// Header of the most recently added node.
    pub fn last_header(&self) -> Option<VersionHeader> {
        let state = self.read();
        state
            .last
            .and_then(|v| state.nodes.get(&v))
            .map(|node| node.header.clone())
    }

    /// Payload type of the most recently added node.
    pub fn payload_type(&self) -> Option<String> {
        self.last_header().map(|h| h.payload_type)
    }

    /// `version` followed by its `previous_version` chain, as far as the
    /// nodes are held and at most `search_depth` steps back.
    pub fn ancestry(&self, version: VersionId) -> Vec<VersionId> {
        let state = self.read();
        let mut chain = Vec::new();
        let mut cursor = Some(version);
        while let Some(current) = cursor {
            let Some(node) = state.nodes.get(&current) else {
                break;
            };
            chain.push(current);
            if chain.len() > self.search_depth {
                break;
            }
            cursor = node.header.previous_version;
        }
        chain
    }

    // ---------------------------------------------------------------
    // Merged reads
    // ---------------------------------------------------------------

    /// The entity's current value, merging the leaves if it has forked.
    ///
    /// A single leaf is returned as is, without calling the merger. Several
    /// leaves are reduced in ascending version-id order: each one is merged
    /// three-way into the accumulator against the nearest ancestor it shares
    /// with the leaves already reduced, or applied as a base-less edit when
    /// no ancestor is found within the search depth. A deleted leaf with no
    /// shared ancestor still deletes the entity.
    ///
    /// Returns `Ok(None)` for an empty graph or a deleted entity.
    pub fn fetch_merged(
        &self,
        merger: &dyn Reconciler,
        registry: &TypeRegistry,
    ) -> DagResult<Option<Value>> {
        let mut leaves = self.leaves();
        if leaves.len() <= 1 {
            return match leaves.pop() {
                Some(leaf) if !leaf.is_tombstone() => Ok(Some(leaf.value(registry)?)),
                _ => Ok(None),
            };
        }

        leaves.sort_by_key(|leaf| leaf.version());
        let mut rest = leaves.into_iter();
        let Some(first) = rest.next() else {
            return Ok(None);
        };

        let mut acc = first.value(registry)?;
        let mut seen: HashSet<VersionId> = self.ancestry(first.version()).into_iter().collect();
        for leaf in rest {
            let value = leaf.value(registry)?;
            let chain = self.ancestry(leaf.version());
            let ancestor = chain
                .iter()
                .find(|v| seen.contains(*v))
                .and_then(|v| self.get(v));
            acc = match ancestor {
                Some(common) => {
                    let common = common.value(registry)?;
                    merger.merge_three_way(&common, &acc, &value)
                }
                None if value.is_null() || acc.is_null() => Value::Null,
                None => {
                    debug!(
                        entity = %self.entity.short_id(),
                        version = %leaf.version().short_id(),
                        "no common ancestor, applying as edit"
                    );
                    merger.apply_delta(&Value::Null, &value, &acc)
                }
            };
            seen.extend(chain);
        }

        Ok(if acc.is_null() { None } else { Some(acc) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use braid_merge::StructuralMerger;

    // ----------------------------------------------------------
    // Helpers
    // ----------------------------------------------------------

    fn entity() -> EntityId {
        EntityId::from_u128(1)
    }

    fn vid(n: u128) -> VersionId {
        VersionId::from_u128(n)
    }

    fn make_node(version: u128, previous: Option<u128>, offset: u64, value: Value) -> VersionNode {
        let mut header = VersionHeader::root(entity(), "doc")
            .with_version(vid(version))
            .with_previous(previous.map(vid));
        header.partition_offset = offset;
        VersionNode::with_value(header, value)
    }

    fn make_merge_node(version: u128, previous: u128, merges: &[u128], offset: u64, value: Value) -> VersionNode {
        let mut node = make_node(version, Some(previous), offset, value);
        node.header.merges = merges.iter().map(|m| vid(*m)).collect();
        node
    }

    fn make_tombstone(version: u128, previous: u128, offset: u64) -> VersionNode {
        let mut header = VersionHeader::root(entity(), "doc")
            .with_version(vid(version))
            .with_previous(Some(vid(previous)));
        header.partition_offset = offset;
        VersionNode::tombstone(header)
    }

    fn set(items: &[&str]) -> Value {
        Value::set_of(items.iter().map(|s| Value::text(*s)))
    }

    /// Counts every call, delegating to the structural merger.
    #[derive(Default)]
    struct CountingMerger {
        inner: StructuralMerger,
        calls: AtomicUsize,
    }

    impl Reconciler for CountingMerger {
        fn merge_three_way(&self, common: &Value, left: &Value, right: &Value) -> Value {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.merge_three_way(common, left, right)
        }

        fn apply_delta(&self, base: &Value, what: &Value, existing: &Value) -> Value {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.apply_delta(base, what, existing)
        }
    }

    // ----------------------------------------------------------
    // Leaf bookkeeping
    // ----------------------------------------------------------

    #[test]
    fn empty_graph() {
        let graph = VersionGraph::new(entity());
        assert!(graph.is_empty());
        assert!(graph.leaves().is_empty());
        assert!(!graph.requires_merge());
        assert!(graph.most_recent_by_offset().is_none());
        assert!(!graph.has_payload());
        assert!(graph.first_offset().is_none());
        let merged = graph
            .fetch_merged(&StructuralMerger::default(), &TypeRegistry::new())
            .unwrap();
        assert!(merged.is_none());
    }

    #[test]
    fn leaf_count_through_fork_and_merge() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        assert_eq!(graph.leaf_count(), 1);

        graph.add(make_node(2, Some(1), 1, Value::Int(1))).unwrap();
        graph.add(make_node(3, Some(1), 2, Value::Int(2))).unwrap();
        assert_eq!(graph.leaf_count(), 2);
        assert!(graph.requires_merge());

        graph.add(make_node(4, Some(1), 3, Value::Int(3))).unwrap();
        assert_eq!(graph.leaf_count(), 3);

        graph
            .add(make_merge_node(5, 2, &[3, 4], 4, Value::Int(6)))
            .unwrap();
        assert_eq!(graph.leaf_count(), 1);
        assert_eq!(graph.leaves()[0].version(), vid(5));
        assert!(!graph.requires_merge());
    }

    #[test]
    fn linear_chain_has_one_leaf() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        for n in 2..=4u128 {
            graph
                .add(make_node(n, Some(n - 1), n as u64, Value::Int(n as i64)))
                .unwrap();
            let leaves = graph.leaves();
            assert_eq!(leaves.len(), 1);
            assert_eq!(leaves[0].version(), vid(n));
        }
    }

    #[test]
    fn leaves_keep_insertion_order() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        graph.add(make_node(9, Some(1), 1, Value::Int(1))).unwrap();
        graph.add(make_node(3, Some(1), 2, Value::Int(2))).unwrap();
        let order: Vec<_> = graph.leaves().iter().map(|n| n.version()).collect();
        assert_eq!(order, vec![vid(9), vid(3)]);
    }

    #[test]
    fn duplicate_add_is_a_no_op() {
        let graph = VersionGraph::new(entity());
        assert!(graph.add(make_node(1, None, 0, Value::Int(0))).unwrap());
        assert!(!graph.add(make_node(1, None, 0, Value::Int(0))).unwrap());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.leaf_count(), 1);
        assert_eq!(graph.history(), vec![0]);
    }

    #[test]
    fn parent_arriving_late_never_becomes_leaf() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(2, Some(1), 1, Value::Int(1))).unwrap();
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        let leaves = graph.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].version(), vid(2));
    }

    #[test]
    fn wrong_entity_is_rejected() {
        let graph = VersionGraph::new(EntityId::from_u128(99));
        let result = graph.add(make_node(1, None, 0, Value::Int(0)));
        assert!(matches!(result, Err(DagError::EntityMismatch { .. })));
    }

    #[test]
    fn most_recent_and_has_payload() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        graph.add(make_node(2, Some(1), 5, Value::Int(1))).unwrap();
        graph.add(make_tombstone(3, 1, 7)).unwrap();
        let recent = graph.most_recent_by_offset().unwrap();
        assert_eq!(recent.version(), vid(3));
        assert!(!graph.has_payload());

        graph.add(make_node(4, Some(2), 9, Value::Int(2))).unwrap();
        assert!(graph.has_payload());
    }

    #[test]
    fn offsets_and_last_header() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 10, Value::Int(0))).unwrap();
        graph.add(make_node(2, Some(1), 12, Value::Int(1))).unwrap();
        assert_eq!(graph.history(), vec![10, 12]);
        assert_eq!(graph.first_offset(), Some(10));
        assert_eq!(graph.last_offset(), Some(12));
        assert_eq!(graph.last_header().unwrap().version, vid(2));
        assert_eq!(graph.payload_type().as_deref(), Some("doc"));
        assert!(graph.contains(&vid(1)));
        assert!(!graph.contains(&vid(3)));
    }

    #[test]
    fn ancestry_respects_depth() {
        let graph = VersionGraph::new(entity()).with_search_depth(2);
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        for n in 2..=5u128 {
            graph
                .add(make_node(n, Some(n - 1), n as u64, Value::Int(0)))
                .unwrap();
        }
        assert_eq!(graph.ancestry(vid(5)), vec![vid(5), vid(4), vid(3)]);
        assert_eq!(graph.ancestry(vid(2)), vec![vid(2), vid(1)]);
    }

    // ----------------------------------------------------------
    // Merged reads
    // ----------------------------------------------------------

    #[test]
    fn single_leaf_skips_the_merger() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        graph.add(make_node(2, Some(1), 1, set(&["a"]))).unwrap();

        let merger = CountingMerger::default();
        let merged = graph.fetch_merged(&merger, &TypeRegistry::new()).unwrap();
        assert_eq!(merged, Some(set(&["a"])));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn single_tombstone_leaf_reads_as_absent() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        graph.add(make_tombstone(2, 1, 1)).unwrap();
        let merged = graph
            .fetch_merged(&StructuralMerger::default(), &TypeRegistry::new())
            .unwrap();
        assert!(merged.is_none());
    }

    #[test]
    fn forked_leaves_merge_against_common_ancestor() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, set(&["a", "b"]))).unwrap();
        graph.add(make_node(2, Some(1), 1, set(&["a", "b", "c"]))).unwrap();
        graph.add(make_node(3, Some(1), 2, set(&["a", "b", "d"]))).unwrap();

        let merger = CountingMerger::default();
        let merged = graph.fetch_merged(&merger, &TypeRegistry::new()).unwrap();
        assert_eq!(merged, Some(set(&["a", "b", "c", "d"])));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn counters_from_three_leaves_add_up() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Counter(10))).unwrap();
        graph.add(make_node(2, Some(1), 1, Value::Counter(11))).unwrap();
        graph.add(make_node(3, Some(1), 2, Value::Counter(15))).unwrap();
        graph.add(make_node(4, Some(1), 3, Value::Counter(8))).unwrap();

        let merged = graph
            .fetch_merged(&StructuralMerger::default(), &TypeRegistry::new())
            .unwrap();
        assert_eq!(merged, Some(Value::Counter(14)));
    }

    #[test]
    fn reduction_order_is_by_version_id() {
        let build = |order: &[u128]| {
            let graph = VersionGraph::new(entity());
            graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
            for (offset, n) in order.iter().enumerate() {
                graph
                    .add(make_node(*n, Some(1), offset as u64 + 1, Value::Int(*n as i64)))
                    .unwrap();
            }
            graph
                .fetch_merged(&StructuralMerger::default(), &TypeRegistry::new())
                .unwrap()
        };
        let forward = build(&[2, 3, 4]);
        let backward = build(&[4, 3, 2]);
        assert_eq!(forward, backward);
        // Right-biased scalars: the highest version id is reduced last.
        assert_eq!(forward, Some(Value::Int(4)));
    }

    #[test]
    fn tombstone_leaf_wins_the_merge() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        graph.add(make_node(2, Some(1), 1, Value::Int(5))).unwrap();
        graph.add(make_tombstone(3, 1, 2)).unwrap();
        let merged = graph
            .fetch_merged(&StructuralMerger::default(), &TypeRegistry::new())
            .unwrap();
        assert!(merged.is_none());
    }

    #[test]
    fn unrelated_roots_fall_back_to_apply() {
        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, set(&["a"]))).unwrap();
        graph.add(make_node(2, None, 1, set(&["b"]))).unwrap();
        assert!(graph.requires_merge());

        let merger = CountingMerger::default();
        let merged = graph.fetch_merged(&merger, &TypeRegistry::new()).unwrap();
        assert_eq!(merged, Some(set(&["a", "b"])));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);
    }

    fn make_tombstone_root(version: u128, offset: u64) -> VersionNode {
        let mut header = VersionHeader::root(entity(), "doc").with_version(vid(version));
        header.partition_offset = offset;
        VersionNode::tombstone(header)
    }

    #[test]
    fn unrelated_tombstone_root_deletes_in_either_order() {
        let merger = StructuralMerger::default();
        let registry = TypeRegistry::new();

        let graph = VersionGraph::new(entity());
        graph.add(make_tombstone_root(1, 0)).unwrap();
        graph.add(make_node(2, None, 1, Value::Int(5))).unwrap();
        assert_eq!(graph.leaf_count(), 2);
        assert_eq!(graph.fetch_merged(&merger, &registry).unwrap(), None);

        let graph = VersionGraph::new(entity());
        graph.add(make_node(1, None, 0, Value::Int(5))).unwrap();
        graph.add(make_tombstone_root(2, 1)).unwrap();
        assert_eq!(graph.leaf_count(), 2);
        assert_eq!(graph.fetch_merged(&merger, &registry).unwrap(), None);
    }

    #[test]
    fn readers_share_the_graph() {
        let graph = Arc::new(VersionGraph::new(entity()));
        graph.add(make_node(1, None, 0, Value::Int(0))).unwrap();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let graph = Arc::clone(&graph);
                std::thread::spawn(move || graph.leaves().len())
            })
            .collect();
        graph.add(make_node(2, Some(1), 1, Value::Int(1))).unwrap();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 1);
        }
    }
}
