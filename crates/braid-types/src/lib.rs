//! Foundation types for Braid.
//!
//! Braid is a partitioned, append-only data repository in which several
//! writers may produce new versions of the same entity concurrently. Every
//! other Braid crate depends on `braid-types`.
//!
//! # Key Types
//!
//! - [`EntityId`]: Identity of a logical record (stable across versions)
//! - [`VersionId`]: UUID v7 identifier of one version of an entity
//! - [`PartitionKey`]: The log partition an entity lives on
//! - [`VersionHeader`]: Ancestry and payload metadata of a version record
//! - [`Principal`] / [`WriteGrant`]: Who is acting, and what they may write

pub mod error;
pub mod header;
pub mod ids;
pub mod partition;
pub mod principal;

pub use error::TypeError;
pub use header::VersionHeader;
pub use ids::{EntityId, VersionId};
pub use partition::PartitionKey;
pub use principal::{unix_millis, GrantScope, Principal, WriteGrant};
