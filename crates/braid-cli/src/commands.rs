use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use braid_gate::WriteGate;
use braid_ledger::{InMemoryVersionLog, VersionReader};
use braid_maintenance::{MergeCoordinator, TickReport};
use braid_merge::{Reconciler, StructuralMerger, TypeRegistry, Value};
use braid_types::{EntityId, GrantScope, PartitionKey, WriteGrant};

use crate::cli::*;
use crate::log_file::load_log;
use crate::settings::Settings;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Merge(args) => cmd_merge(args),
        Command::Apply(args) => cmd_apply(args),
        Command::Replay(args) => cmd_replay(args, format),
        Command::Maintain(args) => cmd_maintain(args, format),
    }
}

fn read_value(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(Value::from_json(&json))
}

fn print_value(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    Ok(())
}

fn cmd_merge(args: MergeArgs) -> anyhow::Result<()> {
    let common = read_value(&args.common)?;
    let left = read_value(&args.left)?;
    let right = read_value(&args.right)?;
    let merged = StructuralMerger::default().merge_three_way(&common, &left, &right);
    print_value(&merged)
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let base = read_value(&args.base)?;
    let what = read_value(&args.what)?;
    let existing = read_value(&args.existing)?;
    let applied = StructuralMerger::default().apply_delta(&base, &what, &existing);
    print_value(&applied)
}

/// One entity's state after replay.
#[derive(Serialize)]
struct EntityView {
    partition: PartitionKey,
    entity: EntityId,
    versions: usize,
    leaves: usize,
    forked: bool,
    /// `None` when the entity is deleted.
    value: Option<serde_json::Value>,
}

/// Decodes and merges with the merger's own registry.
fn entity_views(log: &InMemoryVersionLog, merger: &StructuralMerger) -> anyhow::Result<Vec<EntityView>> {
    let mut views = Vec::new();
    for partition in log.partitions()? {
        let Some(chain) = log.chain(&partition)? else {
            continue;
        };
        for entity in chain.entity_ids() {
            let Some(graph) = chain.graph(&entity) else {
                continue;
            };
            let value = graph.fetch_merged(merger, merger.registry())?;
            views.push(EntityView {
                partition: partition.clone(),
                entity,
                versions: graph.len(),
                leaves: graph.leaf_count(),
                forked: graph.requires_merge(),
                value: value.map(|v| v.to_json()),
            });
        }
    }
    Ok(views)
}

fn print_views(views: &[EntityView]) -> anyhow::Result<()> {
    for view in views {
        let status = if view.forked {
            format!("forked ({} leaves)", view.leaves).yellow()
        } else {
            "resolved".green()
        };
        println!(
            "{} {}  {} versions, {}",
            view.partition.to_string().bold(),
            view.entity.short_id().cyan(),
            view.versions,
            status
        );
        match &view.value {
            Some(json) => println!("  {}", serde_json::to_string(json)?),
            None => println!("  {}", "<deleted>".dimmed()),
        }
    }
    Ok(())
}

fn cmd_replay(args: ReplayArgs, format: OutputFormat) -> anyhow::Result<()> {
    let merger = StructuralMerger::new(Arc::new(TypeRegistry::new()));
    let log = load_log(&args.log, merger.registry(), Default::default())?;
    let views = entity_views(&log, &merger)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
        OutputFormat::Text => {
            let forked = views.iter().filter(|v| v.forked).count();
            println!(
                "Replayed {} entities across {} partitions, {} forked",
                views.len().to_string().bold(),
                log.partitions()?.len(),
                forked.to_string().yellow()
            );
            print_views(&views)?;
        }
    }
    Ok(())
}

fn find_partition(log: &InMemoryVersionLog, entity: &EntityId) -> anyhow::Result<PartitionKey> {
    for partition in log.partitions()? {
        if let Some(chain) = log.chain(&partition)? {
            if chain.graph(entity).is_some() {
                return Ok(partition);
            }
        }
    }
    anyhow::bail!("entity {entity} is not in the log")
}

fn cmd_maintain(args: MaintainArgs, format: OutputFormat) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let registry = Arc::new(TypeRegistry::new());
    let merger = StructuralMerger::new(registry.clone());
    let log = Arc::new(load_log(&args.log, &registry, settings.maintenance.chain_config())?);

    let runtime = tokio::runtime::Runtime::new()?;
    let reports = runtime.block_on(async {
        let coordinator = MergeCoordinator::builder(log.clone(), log.clone())
            .config(settings.maintenance.clone())
            .authority(Arc::new(WriteGate::with_default_stages(settings.gate())))
            .registry(registry.clone())
            .merger(Arc::new(merger.clone()))
            .build()?;

        for partition in log.partitions()? {
            coordinator.attach_partition(partition.clone())?;
            coordinator.lend_rights(&partition, [WriteGrant::new(GrantScope::Partition(partition.clone()))])?;
        }
        for entity in &args.tombstone {
            coordinator.tombstone(&find_partition(&log, entity)?, *entity)?;
        }
        for entity in &args.force_merge {
            coordinator.schedule_merge(&find_partition(&log, entity)?, *entity, true)?;
        }

        let reports = coordinator.force_maintenance_now().await;
        coordinator.shutdown().await;
        Ok::<Vec<TickReport>, anyhow::Error>(reports?)
    })?;

    let views = entity_views(&log, &merger)?;
    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({ "reports": reports, "entities": views });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                println!(
                    "{} {} merged, {} recommitted, {} tombstoned",
                    report.partition.to_string().bold(),
                    report.merged.len().to_string().green(),
                    report.recommitted.len(),
                    report.tombstoned.len().to_string().red()
                );
                if !report.denied.is_empty() {
                    println!("  {} {} denied", "!".yellow(), report.denied.len());
                }
                if !report.failed.is_empty() {
                    println!("  {} {} failed", "✗".red(), report.failed.len());
                }
            }
            print_views(&views)?;
        }
    }
    Ok(())
}
