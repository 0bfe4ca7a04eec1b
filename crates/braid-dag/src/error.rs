//! Error types for version graphs.

use braid_merge::MergeError;
use braid_types::EntityId;

/// Errors that can occur while building or reading a version graph.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A node was offered to the graph of a different entity.
    #[error("node for entity {found} offered to graph of entity {expected}")]
    EntityMismatch {
        /// The entity the graph tracks.
        expected: EntityId,
        /// The entity named in the node's header.
        found: EntityId,
    },

    /// A payload could not be decoded for merging.
    #[error(transparent)]
    Payload(#[from] MergeError),
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
