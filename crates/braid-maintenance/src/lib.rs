//! Merge coordinator for Braid.
//!
//! One loop per attached partition wakes on a jittered timer, picks up
//! due tombstones, scheduled merges and forked entities, and appends
//! reconciliation records through a [`braid_ledger::VersionSink`]. Writes
//! are checked against a [`braid_gate::WriteAuthority`]; denied or failed
//! entities are left for the next tick.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use braid_gate::AllowAll;
//! use braid_ledger::InMemoryVersionLog;
//! use braid_maintenance::{MaintenanceConfig, MergeCoordinator};
//! use braid_types::PartitionKey;
//!
//! # async fn run() -> braid_maintenance::Result<()> {
//! let log = Arc::new(InMemoryVersionLog::new());
//! let coordinator = MergeCoordinator::builder(log.clone(), log)
//!     .config(MaintenanceConfig::default())
//!     .authority(Arc::new(AllowAll))
//!     .build()?;
//!
//! let partition = PartitionKey::new("accounts", 0);
//! coordinator.attach_partition(partition.clone())?;
//! let report = coordinator.force_partition_now(&partition).await?;
//! println!("merged {} entities", report.merged.len());
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod schedule;

pub use config::MaintenanceConfig;
pub use coordinator::{MergeCoordinator, MergeCoordinatorBuilder, Phase, TickReport};
pub use error::{MaintenanceError, Result};
pub use schedule::{DueWork, Schedule};
