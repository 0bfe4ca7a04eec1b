//! Log boundary for Braid.
//!
//! Provides:
//! - [`VersionRecord`]: header plus opaque payload, framed with bincode
//! - [`VersionSink`] / [`VersionReader`]: append and read interfaces
//! - [`TrustValidator`]: the chain-of-trust check run before indexing
//! - [`InMemoryVersionLog`]: a partitioned log that indexes every append
//!   into a [`braid_dag::PartitionChain`]
//! - replay helpers for rebuilding chains from stored frames

pub mod error;
pub mod memory;
pub mod record;
pub mod replay;
pub mod traits;
pub mod trust;

pub use error::LogError;
pub use memory::InMemoryVersionLog;
pub use record::VersionRecord;
pub use replay::{decode_frames, replay_chain, ReplaySummary};
pub use traits::{Ack, VersionReader, VersionSink};
pub use trust::{AcceptAll, PayloadTypeAllowList, TrustValidator};
