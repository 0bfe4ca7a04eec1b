//! Pending maintenance actions for one partition.

use std::collections::BTreeMap;

use tokio::time::Instant;

use braid_types::EntityId;

/// Scheduled tombstones and merges, each keyed by entity with a due time.
#[derive(Debug, Default)]
pub struct Schedule {
    tombstones: BTreeMap<EntityId, Instant>,
    forced: BTreeMap<EntityId, Instant>,
    if_needed: BTreeMap<EntityId, Instant>,
}

/// Work that has come due, in entity order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DueWork {
    pub tombstones: Vec<EntityId>,
    pub forced: Vec<EntityId>,
    pub if_needed: Vec<EntityId>,
}

impl DueWork {
    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty() && self.forced.is_empty() && self.if_needed.is_empty()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a tombstone; rescheduling keeps the later due time so a
    /// fresh request always gets a full grace window.
    pub fn tombstone(&mut self, entity: EntityId, due: Instant) {
        let slot = self.tombstones.entry(entity).or_insert(due);
        *slot = (*slot).max(due);
    }

    pub fn cancel_tombstone(&mut self, entity: &EntityId) -> bool {
        self.tombstones.remove(entity).is_some()
    }

    /// Schedule a merge. A forced request supersedes an if-needed one for
    /// the same entity.
    pub fn merge(&mut self, entity: EntityId, force: bool, due: Instant) {
        if force {
            self.if_needed.remove(&entity);
            let slot = self.forced.entry(entity).or_insert(due);
            *slot = (*slot).min(due);
        } else if !self.forced.contains_key(&entity) {
            let slot = self.if_needed.entry(entity).or_insert(due);
            *slot = (*slot).min(due);
        }
    }

    pub fn cancel_merge(&mut self, entity: &EntityId) -> bool {
        let forced = self.forced.remove(entity).is_some();
        let if_needed = self.if_needed.remove(entity).is_some();
        forced || if_needed
    }

    /// Remove and return everything due at or before `now`.
    pub fn take_due(&mut self, now: Instant) -> DueWork {
        DueWork {
            tombstones: drain_due(&mut self.tombstones, now),
            forced: drain_due(&mut self.forced, now),
            if_needed: drain_due(&mut self.if_needed, now),
        }
    }

    /// Make every pending action due at `now`.
    pub fn fast_forward(&mut self, now: Instant) {
        for due in self
            .tombstones
            .values_mut()
            .chain(self.forced.values_mut())
            .chain(self.if_needed.values_mut())
        {
            *due = (*due).min(now);
        }
    }

    pub fn has_tombstone(&self, entity: &EntityId) -> bool {
        self.tombstones.contains_key(entity)
    }

    pub fn has_merge(&self, entity: &EntityId) -> bool {
        self.forced.contains_key(entity) || self.if_needed.contains_key(entity)
    }

    pub fn pending(&self) -> usize {
        self.tombstones.len() + self.forced.len() + self.if_needed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

fn drain_due(queue: &mut BTreeMap<EntityId, Instant>, now: Instant) -> Vec<EntityId> {
    let due: Vec<EntityId> = queue
        .iter()
        .filter(|(_, at)| **at <= now)
        .map(|(entity, _)| *entity)
        .collect();
    for entity in &due {
        queue.remove(entity);
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_entity(n: u128) -> EntityId {
        EntityId::from_u128(n)
    }

    #[test]
    fn only_due_entries_are_taken() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.tombstone(make_entity(1), now);
        schedule.tombstone(make_entity(2), now + Duration::from_secs(5));

        let due = schedule.take_due(now);
        assert_eq!(due.tombstones, vec![make_entity(1)]);
        assert!(schedule.has_tombstone(&make_entity(2)));
        assert_eq!(schedule.pending(), 1);
    }

    #[test]
    fn cancel_tombstone_reports_presence() {
        let mut schedule = Schedule::new();
        schedule.tombstone(make_entity(1), Instant::now());
        assert!(schedule.cancel_tombstone(&make_entity(1)));
        assert!(!schedule.cancel_tombstone(&make_entity(1)));
        assert!(schedule.is_empty());
    }

    #[test]
    fn forced_merge_supersedes_if_needed() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.merge(make_entity(1), false, now);
        schedule.merge(make_entity(1), true, now);
        schedule.merge(make_entity(1), false, now);

        let due = schedule.take_due(now);
        assert_eq!(due.forced, vec![make_entity(1)]);
        assert!(due.if_needed.is_empty());
    }

    #[test]
    fn cancel_merge_clears_both_queues() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.merge(make_entity(1), true, now);
        schedule.merge(make_entity(2), false, now);
        assert!(schedule.cancel_merge(&make_entity(1)));
        assert!(schedule.cancel_merge(&make_entity(2)));
        assert!(!schedule.has_merge(&make_entity(1)));
        assert!(schedule.take_due(now).is_empty());
    }

    #[test]
    fn fast_forward_makes_everything_due() {
        let now = Instant::now();
        let later = now + Duration::from_secs(60);
        let mut schedule = Schedule::new();
        schedule.tombstone(make_entity(1), later);
        schedule.merge(make_entity(2), true, later);
        schedule.merge(make_entity(3), false, later);

        assert!(schedule.take_due(now).is_empty());
        schedule.fast_forward(now);
        let due = schedule.take_due(now);
        assert_eq!(due.tombstones, vec![make_entity(1)]);
        assert_eq!(due.forced, vec![make_entity(2)]);
        assert_eq!(due.if_needed, vec![make_entity(3)]);
    }

    #[test]
    fn rescheduled_tombstone_keeps_later_due_time() {
        let now = Instant::now();
        let mut schedule = Schedule::new();
        schedule.tombstone(make_entity(1), now);
        schedule.tombstone(make_entity(1), now + Duration::from_secs(5));
        assert!(schedule.take_due(now).is_empty());
    }
}
