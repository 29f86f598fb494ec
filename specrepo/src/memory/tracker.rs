//! Per-context change tracker

use std::any::Any;

use super::store::Tables;
use crate::context::{
    Entity, EntityState, Record, StoreError, StoreOperation, StoreResult, TrackedEntry,
};

/// A tracked entity with the committed version it was read at
pub(super) struct TrackedRow<T: Entity> {
    pub(super) entity: T,
    pub(super) key: T::Key,
    pub(super) state: EntityState,
    pub(super) original_version: Option<u64>,
}

impl<T: Entity> TrackedRow<T> {
    pub(super) fn new(entity: T, state: EntityState, original_version: Option<u64>) -> Self {
        Self {
            key: entity.key(),
            entity,
            state,
            original_version,
        }
    }

    fn key_string(&self) -> String {
        format!("{:?}", self.key)
    }
}

impl<T: Entity> TrackedEntry for TrackedRow<T> {
    fn entity_name(&self) -> &'static str {
        T::NAME
    }

    fn key(&self) -> String {
        self.key_string()
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    fn record(&self) -> &dyn Record {
        &self.entity
    }

    fn record_mut(&mut self) -> &mut dyn Record {
        &mut self.entity
    }
}

/// Type-erased tracker entry that knows how to persist itself
pub(super) trait PendingEntry: TrackedEntry {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_tracked_mut(&mut self) -> &mut dyn TrackedEntry;

    /// Fail if committing would conflict with the committed tables
    fn check(&self, tables: &Tables) -> StoreResult<()>;

    /// Write to the committed tables and settle the entry's state
    fn commit(&mut self, tables: &mut Tables) -> StoreResult<()>;
}

impl<T: Entity> PendingEntry for TrackedRow<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_tracked_mut(&mut self) -> &mut dyn TrackedEntry {
        self
    }

    fn check(&self, tables: &Tables) -> StoreResult<()> {
        let committed = tables.table::<T>().and_then(|t| t.get(&self.key));
        match (self.state, committed) {
            (EntityState::Added, Some(_)) => {
                Err(StoreError::already_exists(T::NAME, self.key_string()))
            }
            (EntityState::Modified | EntityState::Deleted, None) => Err(StoreError::concurrency(
                StoreOperation::Save,
                "The entity no longer exists in the store",
            )
            .with_entity(T::NAME, self.key_string())),
            (EntityState::Modified | EntityState::Deleted, Some(row))
                if self.original_version.is_some_and(|v| v != row.version) =>
            {
                Err(StoreError::concurrency(
                    StoreOperation::Save,
                    format!(
                        "The entity changed since it was read (version {} is now {})",
                        self.original_version.unwrap_or_default(),
                        row.version
                    ),
                )
                .with_entity(T::NAME, self.key_string()))
            }
            _ => Ok(()),
        }
    }

    fn commit(&mut self, tables: &mut Tables) -> StoreResult<()> {
        let table = tables.table_mut::<T>()?;
        match self.state {
            EntityState::Added => {
                let version = table.insert(self.key.clone(), self.entity.clone());
                self.original_version = Some(version);
                self.state = EntityState::Unchanged;
            }
            EntityState::Modified => {
                let version = table.replace(&self.key, self.entity.clone());
                self.original_version = Some(version);
                self.state = EntityState::Unchanged;
            }
            EntityState::Deleted => {
                table.remove(&self.key);
                self.state = EntityState::Detached;
            }
            EntityState::Unchanged | EntityState::Detached => {}
        }
        Ok(())
    }
}

/// Tracked entries in the order they were first seen
#[derive(Default)]
pub(super) struct ChangeTracker {
    entries: Vec<Box<dyn PendingEntry>>,
}

impl ChangeTracker {
    pub(super) fn find<T: Entity>(&self, key: &T::Key) -> Option<&TrackedRow<T>> {
        self.entries
            .iter()
            .filter_map(|e| e.as_any().downcast_ref::<TrackedRow<T>>())
            .find(|row| row.key == *key)
    }

    pub(super) fn find_mut<T: Entity>(&mut self, key: &T::Key) -> Option<&mut TrackedRow<T>> {
        self.entries
            .iter_mut()
            .filter_map(|e| e.as_any_mut().downcast_mut::<TrackedRow<T>>())
            .find(|row| row.key == *key)
    }

    pub(super) fn track<T: Entity>(&mut self, row: TrackedRow<T>) {
        self.entries.push(Box::new(row));
    }

    pub(super) fn untrack<T: Entity>(&mut self, key: &T::Key) {
        self.entries.retain(|e| {
            e.as_any()
                .downcast_ref::<TrackedRow<T>>()
                .map_or(true, |row| row.key != *key)
        });
    }

    pub(super) fn rows<T: Entity>(&self) -> impl Iterator<Item = &TrackedRow<T>> {
        self.entries
            .iter()
            .filter_map(|e| e.as_any().downcast_ref::<TrackedRow<T>>())
    }

    pub(super) fn pending_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn PendingEntry>> {
        self.entries.iter_mut().filter(|e| e.state().is_pending())
    }

    pub(super) fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state().is_pending()).count()
    }

    /// Check every pending entry, then commit them all
    ///
    /// Nothing is written unless every check passes.
    pub(super) fn save(&mut self, tables: &mut Tables) -> StoreResult<u64> {
        for entry in self.entries.iter().filter(|e| e.state().is_pending()) {
            entry.check(tables)?;
        }

        let mut written = 0;
        for entry in self.pending_mut() {
            entry.commit(tables)?;
            written += 1;
        }
        self.entries.retain(|e| e.state() != EntityState::Detached);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoreErrorKind;
    use crate::testing::Item;

    #[test]
    fn test_save_commits_and_settles_states() {
        let mut tables = Tables::default();
        let mut tracker = ChangeTracker::default();
        tracker.track(TrackedRow::new(Item::new(1, "a", 1), EntityState::Added, None));
        tracker.track(TrackedRow::new(Item::new(2, "b", 1), EntityState::Added, None));

        assert_eq!(tracker.save(&mut tables).unwrap(), 2);
        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.find::<Item>(&1).map(|r| r.state), Some(EntityState::Unchanged));
        assert_eq!(tables.table::<Item>().map(|t| t.rows().len()), Some(2));
    }

    #[test]
    fn test_duplicate_insert_writes_nothing() {
        let mut tables = Tables::default();
        tables.table_mut::<Item>().unwrap().insert(1, Item::new(1, "a", 1));

        let mut tracker = ChangeTracker::default();
        tracker.track(TrackedRow::new(Item::new(2, "b", 1), EntityState::Added, None));
        tracker.track(TrackedRow::new(Item::new(1, "a", 1), EntityState::Added, None));

        let err = tracker.save(&mut tables).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::AlreadyExists);
        assert_eq!(tables.table::<Item>().map(|t| t.rows().len()), Some(1));
        assert_eq!(tracker.pending_count(), 2);
    }

    #[test]
    fn test_stale_version_is_a_conflict() {
        let mut tables = Tables::default();
        let table = tables.table_mut::<Item>().unwrap();
        table.insert(1, Item::new(1, "a", 1));
        table.replace(&1, Item::new(1, "b", 1));

        let mut tracker = ChangeTracker::default();
        tracker.track(TrackedRow::new(Item::new(1, "c", 1), EntityState::Modified, Some(1)));

        let err = tracker.save(&mut tables).unwrap_err();
        assert!(err.is_concurrency_conflict());
    }

    #[test]
    fn test_deleted_entries_are_dropped_after_save() {
        let mut tables = Tables::default();
        tables.table_mut::<Item>().unwrap().insert(1, Item::new(1, "a", 1));

        let mut tracker = ChangeTracker::default();
        tracker.track(TrackedRow::new(Item::new(1, "a", 1), EntityState::Deleted, Some(1)));

        assert_eq!(tracker.save(&mut tables).unwrap(), 1);
        assert!(tracker.find::<Item>(&1).is_none());
        assert_eq!(tables.table::<Item>().map(|t| t.rows().len()), Some(0));
    }

    #[test]
    fn test_untrack() {
        let mut tracker = ChangeTracker::default();
        tracker.track(TrackedRow::new(Item::new(1, "a", 1), EntityState::Added, None));
        tracker.untrack::<Item>(&1);
        assert_eq!(tracker.rows::<Item>().count(), 0);
    }
}
