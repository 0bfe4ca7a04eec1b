//! Per-partition collection of version graphs.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use braid_merge::{Reconciler, TypeRegistry, Value};
use braid_types::{EntityId, PartitionKey};

use crate::error::DagResult;
use crate::graph::{VersionGraph, DEFAULT_SEARCH_DEPTH};
use crate::node::VersionNode;

/// Settings shared by every graph of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// How far `previous_version` chains are walked for a common ancestor.
    pub ancestor_search_depth: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ancestor_search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

/// The version graphs of every entity on one partition.
///
/// Entities never span partitions, so a chain is the unit of consumption
/// and of maintenance.
#[derive(Debug)]
pub struct PartitionChain {
    partition: PartitionKey,
    config: ChainConfig,
    graphs: RwLock<BTreeMap<EntityId, Arc<VersionGraph>>>,
}

impl PartitionChain {
    pub fn new(partition: PartitionKey) -> Self {
        Self::with_config(partition, ChainConfig::default())
    }

    pub fn with_config(partition: PartitionKey, config: ChainConfig) -> Self {
        Self {
            partition,
            config,
            graphs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Route a node to its entity's graph, creating the graph on first sight.
    pub fn add(&self, node: VersionNode) -> DagResult<bool> {
        let entity = node.entity();
        let graph = {
            let mut graphs = self.graphs.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(graphs.entry(entity).or_insert_with(|| {
                Arc::new(
                    VersionGraph::new(entity).with_search_depth(self.config.ancestor_search_depth),
                )
            }))
        };
        graph.add(node)
    }

    pub fn graph(&self, entity: &EntityId) -> Option<Arc<VersionGraph>> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    /// Every entity seen on the partition, sorted.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Entities whose graphs currently hold more than one leaf, sorted.
    pub fn forked_entities(&self) -> Vec<EntityId> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, graph)| graph.requires_merge())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Merged value of an entity; `Ok(None)` if unknown or deleted.
    pub fn fetch_merged(
        &self,
        entity: &EntityId,
        merger: &dyn Reconciler,
        registry: &TypeRegistry,
    ) -> DagResult<Option<Value>> {
        match self.graph(entity) {
            Some(graph) => graph.fetch_merged(merger, registry),
            None => Ok(None),
        }
    }

    /// Number of entities on the partition.
    pub fn len(&self) -> usize {
        self.graphs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
