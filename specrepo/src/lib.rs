//! # specrepo
//!
//! Generic repository and composable specification engine over an external
//! entity store.
//!
//! ## Features
//!
//! - **Specifications**: predicates combined with `and` / `or` / `not`,
//!   carrying ordering, distinct, include, window, tag and no-tracking
//!   modifiers
//! - **Repository**: add / attach / update / remove / restore staging,
//!   key lookup, `get` / `single` / `list` / `paged_list` and resolver
//!   queries
//! - **Save pipeline**: validation, audit stamping and soft delete, then
//!   persistence with optimistic-concurrency retry
//! - **Stores**: any [`DataContext`](context::DataContext); an in-memory
//!   reference context ships with the crate and compiled queries render to
//!   parameterized Postgres SQL
//! - **Cancellation**: every store call can race a `CancellationToken`
//!
//! ## Example
//!
//! ```rust,no_run
//! use specrepo::prelude::*;
//!
//! #[derive(Debug, Clone)]
//! struct Order {
//!     id: i64,
//!     status: String,
//!     total: i64,
//! }
//!
//! impl Record for Order {
//!     fn field(&self, name: &str) -> Option<Value> {
//!         match name {
//!             "id" => Some(self.id.into()),
//!             "status" => Some(self.status.as_str().into()),
//!             "total" => Some(self.total.into()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! impl Entity for Order {
//!     type Key = i64;
//!     const NAME: &'static str = "Order";
//!
//!     fn key(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let repository = Repository::with_config(MemoryContext::new(MemoryStore::new()), &config);
//!     repository
//!         .add(Order { id: 1, status: "open".into(), total: 40 })
//!         .await?;
//!     repository.save().await?;
//!
//!     let open = Specification::new(Predicate::<Order>::eq("status", "open"))
//!         .with_order_by_descending("total");
//!     let page = repository.paged_list(0, 20, &open, Some("id")).await?;
//!     println!("{} open orders", page.total_records);
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod observability;
pub mod repository;
pub mod specification;
pub mod validation;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use repository::Repository;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditConfig, CreatedAudit, SoftDeletable, StateActions, UpdatedAudit};
    pub use crate::config::{Config, RepositoryConfig};
    pub use crate::context::{
        DataContext, Entity, EntityState, Record, StoreError, StoreErrorKind, StoreOperation,
        TrackedEntry,
    };
    pub use crate::error::{Error, Result};
    pub use crate::memory::{MemoryContext, MemoryStore};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{PagedResult, Queryable, Repository};
    pub use crate::specification::{
        OrderDirection, Predicate, Query, Specification, Tracking, Value,
    };
    pub use crate::validation::{FieldFailure, ValidationErrors, ValidationProvider};

    pub use tokio_util::sync::CancellationToken;
}
