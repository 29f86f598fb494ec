//! Resolved queries
//!
//! A [`Query<T>`] is what a [`Specification`] resolves to when it reaches the
//! repository: the compiled predicate, a copy of the modifiers and the
//! tracking mode. Stores receive queries, never specifications, and the
//! repository may append to a query (paging windows) without touching the
//! specification it came from.

use std::fmt;

use super::expression::Predicate;
use super::modifier::{ModifierPipeline, PageWindow};
use super::spec::Specification;
use super::sql::{self, SqlStatement};
use crate::context::Entity;

/// Whether fetched entities are attached to the change tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    /// Attach fetched entities as unchanged
    #[default]
    Tracked,
    /// Return detached entities
    NoTracking,
}

/// Compiled filter plus modifiers, ready for a store
pub struct Query<T> {
    predicate: Predicate<T>,
    modifiers: ModifierPipeline,
    tracking: Tracking,
}

impl<T: Entity> Query<T> {
    /// Resolve a specification
    pub fn from_specification(spec: &Specification<T>) -> Self {
        let tracking = if spec.is_no_tracking() {
            Tracking::NoTracking
        } else {
            Tracking::Tracked
        };
        Self {
            predicate: spec.evaluate(),
            modifiers: spec.modifiers().clone(),
            tracking,
        }
    }

    /// Query over every row of `T`
    pub fn all() -> Self {
        Self {
            predicate: Predicate::always(),
            modifiers: ModifierPipeline::new(),
            tracking: Tracking::Tracked,
        }
    }

    /// Filter then modify rows in memory
    pub fn apply(&self, rows: impl IntoIterator<Item = T>) -> Vec<T> {
        let check = self.predicate.compile();
        let filtered = rows.into_iter().filter(|row| check(row)).collect();
        self.modifiers.apply(filtered)
    }

    /// Render as a parameterized `SELECT`
    pub fn to_sql(&self, table: &str) -> SqlStatement {
        let mut statement = SqlStatement::default();
        sql::write_select(&mut statement, table, self.predicate.expression(), &self.modifiers);
        statement
    }

    /// Render as a parameterized `SELECT COUNT(..)`
    pub fn count_sql(&self, table: &str, projection: Option<&str>) -> SqlStatement {
        let mut statement = SqlStatement::default();
        sql::write_count(
            &mut statement,
            table,
            self.predicate.expression(),
            &self.modifiers,
            projection,
        );
        statement
    }
}

impl<T> Query<T> {
    /// Append a skip/take window after the existing modifiers
    #[must_use]
    pub fn with_window(mut self, window: PageWindow) -> Self {
        self.modifiers.window(window);
        self
    }

    /// Override the tracking mode
    #[must_use]
    pub fn with_tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    /// The compiled filter
    pub fn predicate(&self) -> &Predicate<T> {
        &self.predicate
    }

    /// The modifiers in application order
    pub fn modifiers(&self) -> &ModifierPipeline {
        &self.modifiers
    }

    /// Tracking mode
    pub fn tracking(&self) -> Tracking {
        self.tracking
    }

    /// Whether fetched entities should be tracked
    pub fn is_tracked(&self) -> bool {
        self.tracking == Tracking::Tracked
    }

    /// Eager-load paths requested by the specification
    pub fn includes(&self) -> Vec<&str> {
        self.modifiers.includes()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            modifiers: self.modifiers.clone(),
            tracking: self.tracking,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .field("modifiers", &self.modifiers)
            .field("tracking", &self.tracking)
            .finish()
    }
}
