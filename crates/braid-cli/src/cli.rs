use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use braid_types::EntityId;

#[derive(Parser)]
#[command(
    name = "braid",
    about = "Braid: reconcile concurrent versions on a partitioned append-only log",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Explicit log level; overrides --verbose.
    #[arg(long, global = true)]
    pub log_level: Option<Level>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Three-way merge of JSON documents
    Merge(MergeArgs),
    /// Apply the edit base -> what onto an existing JSON document
    Apply(ApplyArgs),
    /// Load a version log and show each entity's leaves and merged value
    Replay(ReplayArgs),
    /// Load a version log and run one forced maintenance pass over it
    Maintain(MaintainArgs),
}

#[derive(Args)]
pub struct MergeArgs {
    pub common: PathBuf,
    pub left: PathBuf,
    pub right: PathBuf,
}

#[derive(Args)]
pub struct ApplyArgs {
    pub base: PathBuf,
    pub what: PathBuf,
    pub existing: PathBuf,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// JSON-lines file of version records
    pub log: PathBuf,
}

#[derive(Args)]
pub struct MaintainArgs {
    /// JSON-lines file of version records
    pub log: PathBuf,

    /// TOML file with [maintenance] and [gate] sections
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Schedule a tombstone for this entity before the pass
    #[arg(long)]
    pub tombstone: Vec<EntityId>,

    /// Schedule a forced merge for this entity before the pass
    #[arg(long)]
    pub force_merge: Vec<EntityId>,
}
