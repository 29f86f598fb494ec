//! Store contracts
//!
//! The repository never talks to a database directly. It drives a
//! [`DataContext`]: a unit of work that stages entities in a change tracker,
//! runs resolved [`Query`]s and persists pending changes in one call.
//!
//! # Overview
//!
//! - [`Record`]: object-safe field access, validation and audit capabilities
//! - [`Entity`]: a typed record with a primary key
//! - [`EntityState`] / [`TrackedEntry`]: the change tracker's view of an entity
//! - [`DataContext`]: the unit of work, async methods via RPITIT
//! - [`StoreError`]: structured store failures
//!
//! A context is not safe for concurrent operations; one caller drives one
//! context serially.

mod error;

pub use error::{StoreError, StoreErrorKind, StoreOperation};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use crate::audit::{CreatedAudit, SoftDeletable, UpdatedAudit};
use crate::specification::{Query, Value};
use crate::validation::FieldFailure;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Object-safe view of an entity
///
/// The audit accessors default to `None`; entities opt in by returning
/// themselves.
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// Read a field by name; `None` if the entity has no such field
    fn field(&self, name: &str) -> Option<Value>;

    /// Field-level validation failures, empty when valid
    fn validate(&self) -> Vec<FieldFailure> {
        Vec::new()
    }

    /// Creation stamp capability
    fn as_created_mut(&mut self) -> Option<&mut dyn CreatedAudit> {
        None
    }

    /// Modification stamp capability
    fn as_updated_mut(&mut self) -> Option<&mut dyn UpdatedAudit> {
        None
    }

    /// Soft-delete capability
    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        None
    }

    /// Mutable soft-delete capability
    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }

    /// Whether deletes of this entity are turned into soft deletes
    fn is_soft_deletable(&self) -> bool {
        self.as_soft_deletable().is_some()
    }
}

/// A record with a primary key
///
/// # Example
///
/// ```rust
/// use specrepo::context::{Entity, Record};
/// use specrepo::specification::Value;
///
/// #[derive(Debug, Clone)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// impl Record for Tag {
///     fn field(&self, name: &str) -> Option<Value> {
///         match name {
///             "id" => Some(self.id.into()),
///             "label" => Some(self.label.clone().into()),
///             _ => None,
///         }
///     }
/// }
///
/// impl Entity for Tag {
///     type Key = i64;
///     const NAME: &'static str = "Tag";
///
///     fn key(&self) -> i64 {
///         self.id
///     }
/// }
/// ```
pub trait Entity: Record + Clone {
    /// Primary key type
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Entity name used in errors and logs
    const NAME: &'static str;

    /// Primary key of this instance
    fn key(&self) -> Self::Key;
}

/// Change-tracker state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Not tracked
    Detached,
    /// Tracked, no pending write
    Unchanged,
    /// Staged for insertion
    Added,
    /// Staged for update
    Modified,
    /// Staged for deletion
    Deleted,
}

impl EntityState {
    /// Whether saving would write this entry
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "detached"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change-tracker entry as seen by validation and state actions
pub trait TrackedEntry: Send {
    /// Entity name
    fn entity_name(&self) -> &'static str;
    /// Primary key, formatted
    fn key(&self) -> String;
    /// Current state
    fn state(&self) -> EntityState;
    /// Move the entry to another state
    fn set_state(&mut self, state: EntityState);
    /// The tracked entity
    fn record(&self) -> &dyn Record;
    /// The tracked entity, mutably
    fn record_mut(&mut self) -> &mut dyn Record;
}

/// Unit of work over an entity store
///
/// Staging methods are batched and only touch the change tracker. Queries
/// and `save_changes` are the store round-trips.
pub trait DataContext: Send + Sync {
    /// Stage entities for insertion
    fn add<T: Entity>(&self, entities: Vec<T>) -> impl Future<Output = StoreResult<()>> + Send;

    /// Track entities as unchanged without staging a write
    fn attach<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()>;

    /// Stage entities as modified
    fn update<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()>;

    /// Stage entities for deletion
    fn remove<T: Entity>(&self, entities: Vec<T>) -> StoreResult<()>;

    /// Look up a single entity by primary key, bypassing any filter
    fn find<T: Entity>(
        &self,
        key: &T::Key,
    ) -> impl Future<Output = StoreResult<Option<T>>> + Send;

    /// Run a resolved query
    fn fetch<T: Entity>(
        &self,
        query: &Query<T>,
    ) -> impl Future<Output = StoreResult<Vec<T>>> + Send;

    /// Count the rows a resolved query returns, optionally through a key column
    fn count<T: Entity>(
        &self,
        query: &Query<T>,
        projection: Option<&str>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Visit every tracked entry with a pending write
    fn for_each_entry(&self, visit: &mut dyn FnMut(&mut dyn TrackedEntry));

    /// Persist every pending change, returning the number of rows written
    fn save_changes(&self) -> impl Future<Output = StoreResult<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_states() {
        assert!(EntityState::Added.is_pending());
        assert!(EntityState::Modified.is_pending());
        assert!(EntityState::Deleted.is_pending());
        assert!(!EntityState::Unchanged.is_pending());
        assert!(!EntityState::Detached.is_pending());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EntityState::Added.to_string(), "added");
        assert_eq!(EntityState::Deleted.to_string(), "deleted");
    }
}
