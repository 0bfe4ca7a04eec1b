//! Version graphs for Braid.
//!
//! Each entity's versions form a small DAG: every version names a primary
//! parent and, for merge commits, additional parents. [`VersionGraph`]
//! tracks that DAG and its leaves (the concurrent branch tips), and serves
//! merged reads through a [`Reconciler`](braid_merge::Reconciler).
//! [`PartitionChain`] holds the graphs of every entity on one partition.

pub mod chain;
pub mod error;
pub mod graph;
pub mod node;

pub use chain::{ChainConfig, PartitionChain};
pub use error::{DagError, DagResult};
pub use graph::{VersionGraph, DEFAULT_SEARCH_DEPTH};
pub use node::VersionNode;
