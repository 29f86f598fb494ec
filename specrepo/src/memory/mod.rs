//! In-memory data context
//!
//! [`MemoryContext`] is a complete [`DataContext`] over a shared
//! [`MemoryStore`]. Each context has its own change tracker; several contexts
//! over one store behave like separate units of work against one database,
//! including optimistic-concurrency conflicts when two of them change the
//! same row.
//!
//! # Example
//!
//! ```rust,ignore
//! use specrepo::memory::{MemoryContext, MemoryStore};
//! use specrepo::Repository;
//!
//! let store = MemoryStore::new();
//! let repository = Repository::new(MemoryContext::new(store.clone()));
//!
//! repository.add(Item::new(1, "widget", 5)).await?;
//! assert_eq!(repository.context().local::<Item>().len(), 1);
//! assert!(store.rows::<Item>().is_empty());
//!
//! repository.save().await?;
//! assert_eq!(store.rows::<Item>().len(), 1);
//! ```

mod store;
mod tracker;

pub use store::MemoryStore;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use self::tracker::{ChangeTracker, TrackedRow};
use crate::context::{
    DataContext, Entity, EntityState, StoreError, StoreOperation, StoreResult, TrackedEntry,
};
use crate::specification::Query;

/// Unit of work over a [`MemoryStore`]
pub struct MemoryContext {
    store: MemoryStore,
    tracker: Mutex<ChangeTracker>,
}

impl MemoryContext {
    /// Context over a store
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    /// The store this context commits to
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracked entities of `T` that are not staged for deletion
    pub fn local<T: Entity>(&self) -> Vec<T> {
        self.tracker()
            .rows::<T>()
            .filter(|row| row.state != EntityState::Deleted)
            .map(|row| row.entity.clone())
            .collect()
    }

    /// Committed rows of `T`
    pub fn persisted<T: Entity>(&self) -> Vec<T> {
        self.store.rows::<T>()
    }

    /// Tracker state of an entity; `Detached` when not tracked
    pub fn entry_state<T: Entity>(&self, key: &T::Key) -> EntityState {
        self.tracker()
            .find::<T>(key)
            .map_or(EntityState::Detached, |row| row.state)
    }

    /// Number of entries a save would write
    pub fn pending_changes(&self) -> usize {
        self.tracker().pending_count()
    }

    fn stage<T: Entity>(
        &self,
        operation: StoreOperation,
        entities: Vec<T>,
        mut transition: impl FnMut(&mut ChangeTracker, T, Option<u64>) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut tracker = self.tracker();
        for entity in entities {
            let version = self.store.version::<T>(&entity.key());
            transition(&mut *tracker, entity, version)?;
        }
        debug!(entity = T::NAME, %operation, pending = tracker.pending_count(), "Staged entities");
        Ok(())
    }
}

impl DataContext for MemoryContext {
    async fn add<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.stage(StoreOperation::Add, entities, |tracker, entity, _| {
            let key = entity.key();
            match tracker.find_mut::<T>(&key) {
                Some(row) if row.state == EntityState::Deleted => {
                    // re-adding a staged delete turns it back into an update
                    row.entity = entity;
                    row.state = EntityState::Modified;
                    Ok(())
                }
                Some(_) => Err(StoreError::already_exists(T::NAME, format!("{:?}", key))
                    .with_operation(StoreOperation::Add)),
                None => {
                    tracker.track(TrackedRow::new(entity, EntityState::Added, None));
                    Ok(())
                }
            }
        })
    }

    fn attach<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.stage(StoreOperation::Attach, entities, |tracker, entity, version| {
            let key = entity.key();
            if tracker.find::<T>(&key).is_some() {
                return Err(StoreError::already_exists(T::NAME, format!("{:?}", key))
                    .with_operation(StoreOperation::Attach));
            }
            tracker.track(TrackedRow::new(entity, EntityState::Unchanged, version));
            Ok(())
        })
    }

    fn update<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.stage(StoreOperation::Update, entities, |tracker, entity, version| {
            match tracker.find_mut::<T>(&entity.key()) {
                Some(row) => {
                    row.entity = entity;
                    if row.state != EntityState::Added {
                        row.state = EntityState::Modified;
                    }
                }
                None => tracker.track(TrackedRow::new(entity, EntityState::Modified, version)),
            }
            Ok(())
        })
    }

    fn remove<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()> {
        self.stage(StoreOperation::Remove, entities, |tracker, entity, version| {
            let key = entity.key();
            match tracker.find::<T>(&key).map(|row| row.state) {
                // never persisted, so there is nothing to delete
                Some(EntityState::Added) => tracker.untrack::<T>(&key),
                Some(_) => {
                    if let Some(row) = tracker.find_mut::<T>(&key) {
                        row.entity = entity;
                        row.state = EntityState::Deleted;
                    }
                }
                None => tracker.track(TrackedRow::new(entity, EntityState::Deleted, version)),
            }
            Ok(())
        })
    }

    async fn find<T: Entity>(&self, key: &T::Key) -> StoreResult<Option<T>> {
        let mut tracker = self.tracker();
        if let Some(row) = tracker.find::<T>(key) {
            return Ok((row.state != EntityState::Deleted).then(|| row.entity.clone()));
        }

        let found = {
            let tables = self.store.lock();
            tables
                .table::<T>()
                .and_then(|t| t.get(key))
                .map(|row| (row.entity.clone(), row.version))
        };
        Ok(found.map(|(entity, version)| {
            tracker.track(TrackedRow::new(
                entity.clone(),
                EntityState::Unchanged,
                Some(version),
            ));
            entity
        }))
    }

    async fn fetch<T: Entity>(&self, query: &Query<T>) -> StoreResult<Vec<T>> {
        let committed: Vec<(T, u64)> = {
            let tables = self.store.lock();
            tables
                .table::<T>()
                .map(|t| {
                    t.rows()
                        .into_iter()
                        .map(|row| (row.entity.clone(), row.version))
                        .collect()
                })
                .unwrap_or_default()
        };
        let versions: std::collections::HashMap<T::Key, u64> = committed
            .iter()
            .map(|(entity, version)| (entity.key(), *version))
            .collect();
        let rows = query.apply(committed.into_iter().map(|(entity, _)| entity));
        debug!(entity = T::NAME, rows = rows.len(), tracked = query.is_tracked(), "Fetched rows");

        if !query.is_tracked() {
            return Ok(rows);
        }

        let mut tracker = self.tracker();
        Ok(rows
            .into_iter()
            .map(|entity| {
                let key = entity.key();
                match tracker.find::<T>(&key) {
                    // identity resolution: the tracked instance wins
                    Some(row) => row.entity.clone(),
                    None => {
                        tracker.track(TrackedRow::new(
                            entity.clone(),
                            EntityState::Unchanged,
                            versions.get(&key).copied(),
                        ));
                        entity
                    }
                }
            })
            .collect())
    }

    async fn count<T: Entity>(&self, query: &Query<T>, projection: Option<&str>) -> StoreResult<u64> {
        let rows = query.apply(self.store.rows::<T>());
        let counted = match projection {
            None => rows.len(),
            Some(column) => {
                let mut counted = 0;
                for row in &rows {
                    match row.field(column) {
                        None => {
                            return Err(StoreError::database_error(
                                StoreOperation::Count,
                                format!("column \"{}\" does not exist on {}", column, T::NAME),
                            ))
                        }
                        Some(value) if !value.is_null() => counted += 1,
                        Some(_) => {}
                    }
                }
                counted
            }
        };
        Ok(counted as u64)
    }

    fn for_each_entry(&self, visit: &mut dyn FnMut(&mut dyn TrackedEntry)) {
        let mut tracker = self.tracker();
        for entry in tracker.pending_mut() {
            visit(entry.as_tracked_mut());
        }
    }

    async fn save_changes(&self) -> StoreResult<u64> {
        let mut tracker = self.tracker();
        let mut tables = self.store.lock();
        tracker.save(&mut tables)
    }
}

impl std::fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContext")
            .field("store", &self.store)
            .field("pending_changes", &self.pending_changes())
            .finish()
    }
}
