//! Composable specifications
//!
//! A specification describes which entities a query selects and how the
//! result is shaped, independently of the store that runs it.
//!
//! # Features
//!
//! - **Predicates**: [`Predicate`] expression trees over entity fields,
//!   evaluable in memory and renderable to SQL
//! - **Composition**: `&`, `|` and `!` on [`Specification`], or the explicit
//!   [`AndSpecification`], [`OrSpecification`] and [`NotSpecification`]
//! - **Modifiers**: includes, ORDER BY / THEN BY chains, distinct and windows
//!   through [`ModifierPipeline`]
//! - **Resolution**: [`Query`] snapshots a specification for a store
//! - **SQL**: [`SqlStatement`] rendering, and `sqlx` builders with the
//!   `database` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use specrepo::specification::{Predicate, Specification};
//!
//! let mut in_stock = Specification::new(Predicate::<Item>::gt("quantity", 0_i64));
//! in_stock.order_by("name").order_by_descending("price");
//!
//! let cheap = Specification::new(Predicate::<Item>::lt("price", 10_i64));
//! let bargains = in_stock & cheap;
//! ```

mod composite;
mod expression;
mod modifier;
mod query;
mod spec;
pub mod sql;
mod value;

pub use composite::{AndSpecification, NotSpecification, OrSpecification};
pub use expression::{Expression, FilterCondition, FilterOperator, OrderDirection, Predicate};
pub use modifier::{Modifier, ModifierPipeline, OrderChain, PageWindow};
pub use query::{Query, Tracking};
pub use spec::{Criterion, Specification};
pub use sql::{SqlStatement, SqlWrite};
pub use value::Value;
