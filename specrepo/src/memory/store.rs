//! Committed tables of the in-memory store

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::{Entity, StoreError, StoreErrorKind, StoreOperation, StoreResult};

pub(super) struct StoredRow<T> {
    pub(super) entity: T,
    pub(super) version: u64,
    seq: u64,
}

/// Rows of one entity type, keyed by primary key
pub(super) struct Table<T: Entity> {
    rows: HashMap<T::Key, StoredRow<T>>,
    next_seq: u64,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T: Entity> Table<T> {
    pub(super) fn get(&self, key: &T::Key) -> Option<&StoredRow<T>> {
        self.rows.get(key)
    }

    /// Insert a new row at version 1
    pub(super) fn insert(&mut self, key: T::Key, entity: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.rows.insert(
            key,
            StoredRow {
                entity,
                version: 1,
                seq,
            },
        );
        1
    }

    /// Overwrite a row and bump its version
    pub(super) fn replace(&mut self, key: &T::Key, entity: T) -> u64 {
        match self.rows.get_mut(key) {
            Some(row) => {
                row.entity = entity;
                row.version += 1;
                row.version
            }
            None => self.insert(key.clone(), entity),
        }
    }

    pub(super) fn remove(&mut self, key: &T::Key) {
        self.rows.remove(key);
    }

    /// Rows in insertion order
    pub(super) fn rows(&self) -> Vec<&StoredRow<T>> {
        let mut rows: Vec<&StoredRow<T>> = self.rows.values().collect();
        rows.sort_by_key(|row| row.seq);
        rows
    }
}

/// Every table, keyed by entity type
#[derive(Default)]
pub(super) struct Tables {
    tables: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Tables {
    pub(super) fn table<T: Entity>(&self) -> Option<&Table<T>> {
        self.tables
            .get(&TypeId::of::<T>())
            .and_then(|t| t.downcast_ref::<Table<T>>())
    }

    pub(super) fn table_mut<T: Entity>(&mut self) -> StoreResult<&mut Table<T>> {
        self.tables
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::default()))
            .downcast_mut::<Table<T>>()
            .ok_or_else(|| {
                StoreError::new(
                    StoreOperation::Save,
                    StoreErrorKind::Other,
                    format!("table for {} has an unexpected type", T::NAME),
                )
            })
    }
}

/// Committed state shared by every [`MemoryContext`](super::MemoryContext)
/// created from it
///
/// Cloning is cheap and yields a handle to the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed rows of `T` in insertion order
    pub fn rows<T: Entity>(&self) -> Vec<T> {
        let tables = self.lock();
        tables
            .table::<T>()
            .map(|t| t.rows().into_iter().map(|row| row.entity.clone()).collect())
            .unwrap_or_default()
    }

    /// Committed version of a row
    pub fn version<T: Entity>(&self, key: &T::Key) -> Option<u64> {
        let tables = self.lock();
        tables.table::<T>().and_then(|t| t.get(key)).map(|row| row.version)
    }

    /// Insert or overwrite rows directly, bypassing any unit of work
    pub fn seed<T: Entity>(&self, entities: impl IntoIterator<Item = T>) -> crate::Result<()> {
        let mut tables = self.lock();
        let table = tables.table_mut::<T>()?;
        for entity in entities {
            let key = entity.key();
            table.replace(&key, entity);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.lock();
        f.debug_struct("MemoryStore")
            .field("tables", &tables.tables.len())
            .finish()
    }
}
