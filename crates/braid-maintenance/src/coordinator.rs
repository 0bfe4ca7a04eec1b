//! Per-partition maintenance loops.
//!
//! Each attached partition runs one loop: sleep for a jittered pause, then
//! scan for due tombstones, scheduled merges and forked entities, and commit
//! reconciliation records for them one entity at a time. Partitions never
//! share state, so their loops run independently.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use braid_dag::{PartitionChain, VersionGraph, VersionNode};
use braid_gate::{GateConfig, WriteAuthority, WriteGate};
use braid_ledger::{VersionReader, VersionRecord, VersionSink};
use braid_merge::{Reconciler, StructuralMerger, TypeRegistry};
use braid_types::{unix_millis, EntityId, PartitionKey, Principal, VersionHeader, VersionId, WriteGrant};

use crate::config::MaintenanceConfig;
use crate::error::{MaintenanceError, Result};
use crate::schedule::{DueWork, Schedule};

/// Where a partition's loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Idle,
    Scanning,
    Merging,
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub partition: PartitionKey,
    /// Tick number, starting at 1. Zero means no tick has completed yet.
    pub tick: u64,
    pub merged: Vec<EntityId>,
    pub recommitted: Vec<EntityId>,
    pub tombstoned: Vec<EntityId>,
    pub denied: Vec<EntityId>,
    pub failed: Vec<EntityId>,
    pub skipped: usize,
}

impl TickReport {
    fn new(partition: PartitionKey, tick: u64) -> Self {
        Self {
            partition,
            tick,
            merged: Vec::new(),
            recommitted: Vec::new(),
            tombstoned: Vec::new(),
            denied: Vec::new(),
            failed: Vec::new(),
            skipped: 0,
        }
    }

    /// Number of records this tick appended.
    pub fn commits(&self) -> usize {
        self.merged.len() + self.recommitted.len() + self.tombstoned.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Tombstone,
    Merge { force: bool },
}

#[derive(Clone, Copy, Debug)]
struct Task {
    entity: EntityId,
    action: Action,
    /// Came from the schedule rather than fork detection.
    scheduled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Merged(VersionId),
    Recommitted(VersionId),
    Tombstoned(VersionId),
    Denied,
    Skipped,
}

struct PartitionState {
    key: PartitionKey,
    schedule: Mutex<Schedule>,
    lent: Mutex<Vec<WriteGrant>>,
    phase: Mutex<Phase>,
    wake: Notify,
    started: AtomicU64,
    reports: watch::Sender<TickReport>,
    cancel: CancellationToken,
}

impl PartitionState {
    fn new(key: PartitionKey, cancel: CancellationToken) -> Self {
        let (reports, _) = watch::channel(TickReport::new(key.clone(), 0));
        Self {
            key,
            schedule: Mutex::new(Schedule::new()),
            lent: Mutex::new(Vec::new()),
            phase: Mutex::new(Phase::Idle),
            wake: Notify::new(),
            started: AtomicU64::new(0),
            reports,
            cancel,
        }
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        lock(&self.schedule)
    }

    fn set_phase(&self, phase: Phase) {
        *lock(&self.phase) = phase;
    }

    /// The principal maintenance writes as, carrying the unexpired lent grants.
    fn acting_principal(&self, now_ms: u64) -> Principal {
        let mut lent = lock(&self.lent);
        lent.retain(|grant| !grant.is_expired_at(now_ms));
        lent.iter()
            .cloned()
            .fold(Principal::new(format!("maintenance:{}", self.key)), |principal, grant| {
                principal.with_grant(grant)
            })
    }

    /// Fast-forward the schedule and wake the loop. Returns the tick number
    /// that is guaranteed to observe the fast-forwarded schedule.
    fn request_tick(&self) -> (watch::Receiver<TickReport>, u64) {
        let receiver = self.reports.subscribe();
        self.schedule().fast_forward(Instant::now());
        let target = self.started.load(Ordering::SeqCst) + 1;
        self.wake.notify_one();
        (receiver, target)
    }

    async fn await_tick(&self, mut receiver: watch::Receiver<TickReport>, target: u64) -> Result<TickReport> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(MaintenanceError::Shutdown),
            seen = receiver.wait_for(|report| report.tick >= target) => match seen {
                Ok(report) => Ok(TickReport::clone(&report)),
                Err(_) => Err(MaintenanceError::Shutdown),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    config: MaintenanceConfig,
    reader: Arc<dyn VersionReader>,
    sink: Arc<dyn VersionSink>,
    authority: Arc<dyn WriteAuthority>,
    merger: Arc<dyn Reconciler>,
    registry: Arc<TypeRegistry>,
    partitions: RwLock<HashMap<PartitionKey, Arc<PartitionState>>>,
    shutdown: CancellationToken,
}

/// Drives reconciliation of forked entities and scheduled deletes.
///
/// Must be used from within a Tokio runtime: attaching a partition spawns
/// its loop.
pub struct MergeCoordinator {
    inner: Arc<Inner>,
    tasks: Mutex<HashMap<PartitionKey, JoinHandle<()>>>,
}

/// Builder for [`MergeCoordinator`].
pub struct MergeCoordinatorBuilder {
    config: MaintenanceConfig,
    reader: Arc<dyn VersionReader>,
    sink: Arc<dyn VersionSink>,
    authority: Option<Arc<dyn WriteAuthority>>,
    merger: Option<Arc<dyn Reconciler>>,
    registry: Option<Arc<TypeRegistry>>,
}

impl MergeCoordinatorBuilder {
    pub fn config(mut self, config: MaintenanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to a [`WriteGate`] with the standard stages, so merges
    /// only go through once rights have been lent.
    pub fn authority(mut self, authority: Arc<dyn WriteAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Defaults to a [`StructuralMerger`] over the registry.
    pub fn merger(mut self, merger: Arc<dyn Reconciler>) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn build(self) -> Result<MergeCoordinator> {
        self.config.validate()?;
        let registry = self.registry.unwrap_or_default();
        let merger = self
            .merger
            .unwrap_or_else(|| Arc::new(StructuralMerger::new(registry.clone())));
        let authority = self
            .authority
            .unwrap_or_else(|| Arc::new(WriteGate::with_default_stages(GateConfig::default())));

        Ok(MergeCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                reader: self.reader,
                sink: self.sink,
                authority,
                merger,
                registry,
                partitions: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
            tasks: Mutex::new(HashMap::new()),
        })
    }
}

impl MergeCoordinator {
    pub fn builder(reader: Arc<dyn VersionReader>, sink: Arc<dyn VersionSink>) -> MergeCoordinatorBuilder {
        MergeCoordinatorBuilder {
            config: MaintenanceConfig::default(),
            reader,
            sink,
            authority: None,
            merger: None,
            registry: None,
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.inner.config
    }

    /// Start the maintenance loop for a partition.
    pub fn attach_partition(&self, partition: PartitionKey) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(MaintenanceError::Shutdown);
        }
        let state = {
            let mut partitions = self.inner.partitions.write().unwrap_or_else(PoisonError::into_inner);
            if partitions.contains_key(&partition) {
                return Err(MaintenanceError::AlreadyAttached(partition));
            }
            let state = Arc::new(PartitionState::new(
                partition.clone(),
                self.inner.shutdown.child_token(),
            ));
            partitions.insert(partition.clone(), state.clone());
            state
        };
        let handle = tokio::spawn(run_loop(self.inner.clone(), state));
        lock(&self.tasks).insert(partition, handle);
        Ok(())
    }

    /// Stop a partition's loop and forget its pending actions.
    pub async fn remove_partition(&self, partition: &PartitionKey) -> Result<()> {
        let state = self
            .inner
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(partition)
            .ok_or_else(|| MaintenanceError::UnknownPartition(partition.clone()))?;
        state.cancel.cancel();
        let handle = lock(&self.tasks).remove(partition);
        if let Some(handle) = handle {
            handle.await.map_err(|e| MaintenanceError::Join(e.to_string()))?;
        }
        Ok(())
    }

    pub fn partitions(&self) -> Vec<PartitionKey> {
        let partitions = self.inner.partitions.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<PartitionKey> = partitions.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn state(&self, partition: &PartitionKey) -> Result<Arc<PartitionState>> {
        self.inner
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .cloned()
            .ok_or_else(|| MaintenanceError::UnknownPartition(partition.clone()))
    }

    /// Schedule a delete commit after the maintenance window.
    pub fn tombstone(&self, partition: &PartitionKey, entity: EntityId) -> Result<()> {
        let state = self.state(partition)?;
        let due = Instant::now() + self.inner.config.maintenance_window;
        state.schedule().tombstone(entity, due);
        debug!(%partition, %entity, "tombstone scheduled");
        Ok(())
    }

    /// Cancel a scheduled tombstone. Returns `false` if none was pending.
    pub fn dont_tombstone(&self, partition: &PartitionKey, entity: EntityId) -> Result<bool> {
        let state = self.state(partition)?;
        let cancelled = state.schedule().cancel_tombstone(&entity);
        if cancelled {
            debug!(%partition, %entity, "tombstone cancelled");
        }
        Ok(cancelled)
    }

    /// Schedule a merge after the maintenance window. A forced merge commits
    /// even when the entity has a single leaf.
    pub fn schedule_merge(&self, partition: &PartitionKey, entity: EntityId, force: bool) -> Result<()> {
        let state = self.state(partition)?;
        let due = Instant::now() + self.inner.config.maintenance_window;
        state.schedule().merge(entity, force, due);
        debug!(%partition, %entity, force, "merge scheduled");
        Ok(())
    }

    pub fn cancel_merge(&self, partition: &PartitionKey, entity: EntityId) -> Result<bool> {
        let state = self.state(partition)?;
        let cancelled = state.schedule().cancel_merge(&entity);
        Ok(cancelled)
    }

    /// Lend write grants to this partition's acting principal. Each grant
    /// expires after `lent_rights_ttl_factor` maintenance windows, or
    /// sooner if it already carried an earlier expiry.
    pub fn lend_rights(&self, partition: &PartitionKey, grants: impl IntoIterator<Item = WriteGrant>) -> Result<()> {
        let state = self.state(partition)?;
        let deadline = unix_millis().saturating_add(self.inner.config.lent_rights_ttl().as_millis() as u64);
        let mut lent = lock(&state.lent);
        for mut grant in grants {
            let expiry = grant.expires_at_ms.map_or(deadline, |at| at.min(deadline));
            grant.expires_at_ms = Some(expiry);
            lent.push(grant);
        }
        debug!(%partition, lent = lent.len(), "rights lent");
        Ok(())
    }

    pub fn phase(&self, partition: &PartitionKey) -> Result<Phase> {
        let state = self.state(partition)?;
        let phase = *lock(&state.phase);
        Ok(phase)
    }

    /// Number of scheduled actions not yet processed.
    pub fn pending(&self, partition: &PartitionKey) -> Result<usize> {
        let state = self.state(partition)?;
        let pending = state.schedule().pending();
        Ok(pending)
    }

    /// Report of the most recently completed tick.
    pub fn last_report(&self, partition: &PartitionKey) -> Result<TickReport> {
        let state = self.state(partition)?;
        let report = state.reports.borrow().clone();
        Ok(report)
    }

    /// Make everything scheduled on one partition due now and wait until a
    /// tick has processed it.
    pub async fn force_partition_now(&self, partition: &PartitionKey) -> Result<TickReport> {
        let state = self.state(partition)?;
        let (receiver, target) = state.request_tick();
        state.await_tick(receiver, target).await
    }

    /// [`Self::force_partition_now`] across every attached partition. All
    /// loops are woken before any is awaited.
    pub async fn force_maintenance_now(&self) -> Result<Vec<TickReport>> {
        let states: Vec<Arc<PartitionState>> = self
            .partitions()
            .iter()
            .map(|partition| self.state(partition))
            .collect::<Result<_>>()?;
        let requests: Vec<_> = states.iter().map(|state| state.request_tick()).collect();

        let mut reports = Vec::with_capacity(states.len());
        for (state, (receiver, target)) in states.iter().zip(requests) {
            reports.push(state.await_tick(receiver, target).await?);
        }
        Ok(reports)
    }

    /// Cancel every loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<(PartitionKey, JoinHandle<()>)> = lock(&self.tasks).drain().collect();
        for (partition, handle) in handles {
            if let Err(e) = handle.await {
                warn!(%partition, error = %e, "maintenance loop ended abnormally");
            }
        }
        info!("merge coordinator shut down");
    }
}

impl Drop for MergeCoordinator {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn run_loop(inner: Arc<Inner>, state: Arc<PartitionState>) {
    info!(partition = %state.key, "maintenance loop started");
    loop {
        let pause = inner.config.next_pause();
        tokio::select! {
            biased;
            _ = state.cancel.cancelled() => break,
            _ = state.wake.notified() => {}
            _ = tokio::time::sleep(pause) => {}
        }
        inner.tick(&state).await;
    }
    state.set_phase(Phase::Idle);
    info!(partition = %state.key, "maintenance loop stopped");
}

impl Inner {
    async fn tick(&self, state: &PartitionState) {
        let tick = state.started.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = TickReport::new(state.key.clone(), tick);

        state.set_phase(Phase::Scanning);
        let due = state.schedule().take_due(Instant::now());
        let chain = match self.reader.chain(&state.key) {
            Ok(chain) => chain,
            Err(e) => {
                warn!(partition = %state.key, error = %e, "failed to read partition chain");
                requeue_all(state, &due);
                state.set_phase(Phase::Idle);
                state.reports.send_replace(report);
                return;
            }
        };
        let plan = plan(&due, chain.as_deref());
        if !plan.is_empty() {
            debug!(partition = %state.key, tick, tasks = plan.len(), "maintenance scan");
        }

        state.set_phase(Phase::Merging);
        let principal = state.acting_principal(unix_millis());
        for task in plan {
            let outcome = match chain.as_deref() {
                Some(chain) => self.run_task(&state.key, chain, &principal, task).await,
                None => Ok(Outcome::Skipped),
            };
            match outcome {
                Ok(Outcome::Merged(_)) => report.merged.push(task.entity),
                Ok(Outcome::Recommitted(_)) => report.recommitted.push(task.entity),
                Ok(Outcome::Tombstoned(_)) => report.tombstoned.push(task.entity),
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Denied) => {
                    debug!(partition = %state.key, entity = %task.entity, "maintenance write not authorized");
                    report.denied.push(task.entity);
                    requeue(state, task);
                }
                Err(e) => {
                    warn!(partition = %state.key, entity = %task.entity, error = %e, "maintenance failed");
                    report.failed.push(task.entity);
                    requeue(state, task);
                }
            }
        }

        state.set_phase(Phase::Idle);
        state.reports.send_replace(report);
    }

    async fn run_task(
        &self,
        partition: &PartitionKey,
        chain: &PartitionChain,
        principal: &Principal,
        task: Task,
    ) -> Result<Outcome> {
        let Some(graph) = chain.graph(&task.entity) else {
            debug!(%partition, entity = %task.entity, "no versions for entity");
            return Ok(Outcome::Skipped);
        };
        let leaves = graph.leaves();
        if leaves.is_empty() {
            return Ok(Outcome::Skipped);
        }

        match task.action {
            Action::Tombstone => {
                if leaves.len() == 1 && leaves[0].is_tombstone() {
                    return Ok(Outcome::Skipped);
                }
                if !self.authority.can_write(principal, partition, &task.entity) {
                    return Ok(Outcome::Denied);
                }
                let record = VersionRecord::tombstone(commit_header(&graph, &leaves));
                let version = record.header.version;
                self.sink.append_version(partition, record).await?;
                info!(%partition, entity = %task.entity, %version, leaves = leaves.len(), "tombstone committed");
                Ok(Outcome::Tombstoned(version))
            }
            Action::Merge { force } => {
                if leaves.len() < 2 && !force {
                    return Ok(Outcome::Skipped);
                }
                if !self.authority.can_write(principal, partition, &task.entity) {
                    return Ok(Outcome::Denied);
                }
                let merged = graph.fetch_merged(self.merger.as_ref(), &self.registry)?;
                let header = commit_header(&graph, &leaves);
                let record = match merged {
                    Some(value) => {
                        let payload = self.registry.encode(&header.payload_type, &value)?;
                        VersionRecord::new(header, payload)
                    }
                    None => VersionRecord::tombstone(header),
                };
                let version = record.header.version;
                self.sink.append_version(partition, record).await?;
                if leaves.len() > 1 {
                    info!(%partition, entity = %task.entity, %version, leaves = leaves.len(), "merge committed");
                    Ok(Outcome::Merged(version))
                } else {
                    info!(%partition, entity = %task.entity, %version, "version recommitted");
                    Ok(Outcome::Recommitted(version))
                }
            }
        }
    }
}

/// Header for a commit that descends from every leaf: the lowest leaf
/// version becomes `previous_version`, the rest become `merges`.
fn commit_header(graph: &VersionGraph, leaves: &[Arc<VersionNode>]) -> VersionHeader {
    let mut versions: Vec<VersionId> = leaves.iter().map(|leaf| leaf.version()).collect();
    versions.sort();
    let payload_type = leaves
        .iter()
        .max_by_key(|leaf| leaf.offset())
        .map(|leaf| leaf.header.payload_type.clone())
        .or_else(|| graph.payload_type())
        .unwrap_or_default();
    let mut rest = versions.into_iter();
    let previous = rest.next();
    VersionHeader::root(graph.entity(), payload_type)
        .with_previous(previous)
        .with_merges(rest)
}

/// Order one tick's work: tombstones, then forced merges, then if-needed
/// merges, then forks nobody scheduled. Each entity is handled once.
fn plan(due: &DueWork, chain: Option<&PartitionChain>) -> Vec<Task> {
    let mut seen = BTreeSet::new();
    let mut tasks = Vec::new();
    let scheduled = due
        .tombstones
        .iter()
        .map(|e| (*e, Action::Tombstone))
        .chain(due.forced.iter().map(|e| (*e, Action::Merge { force: true })))
        .chain(due.if_needed.iter().map(|e| (*e, Action::Merge { force: false })));
    for (entity, action) in scheduled {
        if seen.insert(entity) {
            tasks.push(Task {
                entity,
                action,
                scheduled: true,
            });
        }
    }
    if let Some(chain) = chain {
        for entity in chain.forked_entities() {
            if seen.insert(entity) {
                tasks.push(Task {
                    entity,
                    action: Action::Merge { force: false },
                    scheduled: false,
                });
            }
        }
    }
    tasks
}

fn requeue(state: &PartitionState, task: Task) {
    if !task.scheduled {
        return;
    }
    let now = Instant::now();
    let mut schedule = state.schedule();
    match task.action {
        Action::Tombstone => schedule.tombstone(task.entity, now),
        Action::Merge { force } => schedule.merge(task.entity, force, now),
    }
}

fn requeue_all(state: &PartitionState, due: &DueWork) {
    let now = Instant::now();
    let mut schedule = state.schedule();
    for entity in &due.tombstones {
        schedule.tombstone(*entity, now);
    }
    for entity in &due.forced {
        schedule.merge(*entity, true, now);
    }
    for entity in &due.if_needed {
        schedule.merge(*entity, false, now);
    }
}
