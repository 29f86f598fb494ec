//! Repository facade over a [`DataContext`]
//!
//! [`Repository`] validates arguments before any I/O, resolves
//! [`Specification`]s into queries, stages changes in the context's tracker
//! and runs the save pipeline:
//!
//! 1. every Added or Modified entry is validated; failures abort the save
//! 2. the [`StateActions`] map runs over the pending entries
//! 3. the context persists, retrying optimistic-concurrency conflicts
//!
//! # Example
//!
//! ```rust,ignore
//! use specrepo::prelude::*;
//!
//! let repository = Repository::new(MemoryContext::new(MemoryStore::new()))
//!     .with_retry_attempts(5);
//!
//! repository.add(Item::new(1, "widget", 5)).await?;
//! repository.save().await?;
//!
//! let cheap = Specification::new(Predicate::<Item>::lt("price", 10_i64)).with_order_by("name");
//! let page = repository.paged_list(0, 20, &cheap, Some("id")).await?;
//! ```

pub mod paged;
mod queryable;

pub use paged::PagedResult;
pub use queryable::Queryable;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use self::queryable::guarded;
use crate::audit::StateActions;
use crate::config::Config;
use crate::context::{DataContext, Entity, StoreError, StoreOperation};
use crate::error::{Error, Result};
use crate::specification::{PageWindow, Query, Specification};
use crate::validation::{validate_pending, RecordValidator, ValidationProvider};

/// Save attempts made when nothing else is configured
///
/// Counts the first attempt: one try plus two retries.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Outcome of one persistence attempt
enum SaveAttempt {
    Saved(u64),
    ConflictRetry(StoreError),
    Fatal(Error),
}

/// Specification-driven repository over a unit of work
///
/// One caller drives a repository and its context serially; the context is
/// not expected to handle overlapping operations.
pub struct Repository<C> {
    context: Arc<C>,
    retry_attempts: u32,
    state_actions: StateActions,
    validator: Arc<dyn ValidationProvider>,
    cancellation: Option<CancellationToken>,
}

impl<C: DataContext> Repository<C> {
    /// Repository with default settings and no audit actions
    pub fn new(context: C) -> Self {
        Self::from_arc(Arc::new(context))
    }

    /// Repository over a shared context
    pub fn from_arc(context: Arc<C>) -> Self {
        Self {
            context,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            state_actions: StateActions::new(),
            validator: Arc::new(RecordValidator),
            cancellation: None,
        }
    }

    /// Repository configured from [`Config`]
    pub fn with_config(context: C, config: &Config) -> Self {
        Self::new(context)
            .with_retry_attempts(config.repository.retry_attempts)
            .with_state_actions(StateActions::from_config(&config.audit))
    }

    /// Total save attempts on concurrency conflicts, counting the first try
    ///
    /// `3` means one try and at most two retries, not three retries. Values
    /// below 1 are raised to 1.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Replace the actions run over pending entries before persistence
    #[must_use]
    pub fn with_state_actions(mut self, actions: StateActions) -> Self {
        self.state_actions = actions;
        self
    }

    /// Replace the validation provider
    #[must_use]
    pub fn with_validator(mut self, validator: impl ValidationProvider + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Race every store call against `token`
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The underlying context
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Configured total save attempts, including the first
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    // -- Staging ------------------------------------------------------------

    /// Stage an entity for insertion
    pub async fn add<T: Entity>(&self, entity: impl Into<Option<T>>) -> Result<&Self> {
        let entity = require(entity.into(), "entity")?;
        guarded(self.cancellation.as_ref(), self.context.add(vec![entity])).await?;
        Ok(self)
    }

    /// Stage several entities for insertion
    pub async fn add_range<T: Entity>(&self, entities: impl Into<Option<Vec<T>>>) -> Result<&Self> {
        let entities = require_non_empty(entities.into(), "add")?;
        guarded(self.cancellation.as_ref(), self.context.add(entities)).await?;
        Ok(self)
    }

    /// Track an entity as unchanged
    pub fn attach<T: Entity>(&self, entity: impl Into<Option<T>>) -> Result<&Self> {
        let entity = require(entity.into(), "entity")?;
        self.context.attach(vec![entity])?;
        Ok(self)
    }

    /// Track several entities as unchanged
    pub fn attach_range<T: Entity>(&self, entities: impl Into<Option<Vec<T>>>) -> Result<&Self> {
        let entities = require_non_empty(entities.into(), "attach")?;
        self.context.attach(entities)?;
        Ok(self)
    }

    /// Stage an entity for update
    pub fn update<T: Entity>(&self, entity: impl Into<Option<T>>) -> Result<&Self> {
        let entity = require(entity.into(), "entity")?;
        self.context.update(vec![entity])?;
        Ok(self)
    }

    /// Stage several entities for update
    pub fn update_range<T: Entity>(&self, entities: impl Into<Option<Vec<T>>>) -> Result<&Self> {
        let entities = require_non_empty(entities.into(), "update")?;
        self.context.update(entities)?;
        Ok(self)
    }

    /// Stage an entity for deletion
    ///
    /// With audit actions installed, soft-deletable entities are stamped and
    /// updated on save instead of being removed.
    pub fn remove<T: Entity>(&self, entity: impl Into<Option<T>>) -> Result<&Self> {
        let entity = require(entity.into(), "entity")?;
        self.context.remove(vec![entity])?;
        Ok(self)
    }

    /// Stage several entities for deletion
    pub fn remove_range<T: Entity>(&self, entities: impl Into<Option<Vec<T>>>) -> Result<&Self> {
        let entities = require_non_empty(entities.into(), "remove")?;
        self.context.remove(entities)?;
        Ok(self)
    }

    /// Clear the soft-delete fields of an entity and stage it for update
    pub fn restore<T: Entity>(&self, entity: impl Into<Option<T>>) -> Result<&Self> {
        let entity = restored(require(entity.into(), "entity")?, "entity")?;
        self.context.update(vec![entity])?;
        Ok(self)
    }

    /// Restore several soft-deleted entities
    pub fn restore_range<T: Entity>(&self, entities: impl Into<Option<Vec<T>>>) -> Result<&Self> {
        let entities = require_non_empty(entities.into(), "restore")?
            .into_iter()
            .map(|entity| restored(entity, "entities"))
            .collect::<Result<Vec<T>>>()?;
        self.context.update(entities)?;
        Ok(self)
    }

    // -- Reads --------------------------------------------------------------

    /// Look an entity up by key, bypassing any filtering
    pub async fn find_by_primary_key<T: Entity>(
        &self,
        primary_key: impl Into<Option<T::Key>>,
    ) -> Result<Option<T>> {
        let key = require(primary_key.into(), "primary_key")?;
        guarded(self.cancellation.as_ref(), self.context.find::<T>(&key)).await
    }

    /// First match after modifiers
    pub async fn get<'s, T: Entity>(
        &self,
        specification: impl Into<Option<&'s Specification<T>>>,
    ) -> Result<Option<T>> {
        let query = resolve(specification.into())?.with_window(PageWindow::new(0, 1));
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    /// The sole match, `None` when nothing matches
    ///
    /// More than one match is [`Error::MultipleResults`].
    pub async fn single<'s, T: Entity>(
        &self,
        specification: impl Into<Option<&'s Specification<T>>>,
    ) -> Result<Option<T>> {
        let query = resolve(specification.into())?;
        let mut rows = self.fetch(&query).await?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            count => Err(Error::MultipleResults {
                entity: T::NAME,
                count,
            }),
        }
    }

    /// Every match
    pub async fn list<'s, T: Entity>(
        &self,
        specification: impl Into<Option<&'s Specification<T>>>,
    ) -> Result<Vec<T>> {
        let query = resolve(specification.into())?;
        self.fetch(&query).await
    }

    /// One 0-based page of matches
    ///
    /// The total is counted first, through `primary_key` when given, then
    /// the page window is applied after the specification's own modifiers.
    pub async fn paged_list<'s, T: Entity>(
        &self,
        page: i64,
        page_size: i64,
        specification: impl Into<Option<&'s Specification<T>>>,
        primary_key: Option<&str>,
    ) -> Result<PagedResult<T>> {
        let query = resolve(specification.into())?;
        if page < 0 {
            return Err(Error::OutOfRange { param: "page" });
        }
        if page_size <= 0 {
            return Err(Error::OutOfRange { param: "page_size" });
        }

        let total = guarded(
            self.cancellation.as_ref(),
            self.context.count(&query, primary_key),
        )
        .await?;
        let window = PageWindow::page(page.unsigned_abs(), page_size.unsigned_abs());
        let items = self.fetch(&query.with_window(window)).await?;

        debug!(
            entity = T::NAME,
            page,
            page_size,
            total,
            returned = items.len(),
            "Fetched page"
        );
        Ok(PagedResult::new(
            page,
            page_size,
            i64::try_from(total).unwrap_or(i64::MAX),
            items,
        ))
    }

    /// Hand the resolved query to `resolver` and return its result
    ///
    /// For aggregates, projections, counts and existence checks.
    pub async fn query<'s, T, R, F, Fut>(
        &self,
        specification: impl Into<Option<&'s Specification<T>>>,
        resolver: Option<F>,
    ) -> Result<R>
    where
        T: Entity,
        F: FnOnce(Queryable<C, T>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let query = resolve(specification.into())?;
        let resolver = require(resolver, "resolver")?;
        let queryable = Queryable::new(
            Arc::clone(&self.context),
            query,
            self.cancellation.clone(),
        );
        resolver(queryable).await
    }

    #[instrument(level = "debug", skip_all, fields(entity = T::NAME, tracked = query.is_tracked()))]
    async fn fetch<T: Entity>(&self, query: &Query<T>) -> Result<Vec<T>> {
        guarded(self.cancellation.as_ref(), self.context.fetch(query)).await
    }

    // -- Save ---------------------------------------------------------------

    /// Validate, run state actions, then persist with conflict retries
    ///
    /// Returns the number of rows written.
    pub async fn save(&self) -> Result<u64> {
        self.save_inner(self.cancellation.as_ref()).await
    }

    /// [`save`](Self::save) raced against `token`
    pub async fn save_with_cancellation(&self, token: CancellationToken) -> Result<u64> {
        self.save_inner(Some(&token)).await
    }

    async fn save_inner(&self, token: Option<&CancellationToken>) -> Result<u64> {
        let errors = validate_pending(self.context.as_ref(), self.validator.as_ref());
        if !errors.is_empty() {
            debug!(failed = errors.len(), "Validation failed, nothing saved");
            return Err(Error::Validation(errors));
        }

        self.state_actions.apply(self.context.as_ref());

        let mut last_conflict = None;
        for attempt in 1..=self.retry_attempts {
            match self.attempt_save(token).await {
                SaveAttempt::Saved(rows) => {
                    debug!(attempt, rows, "Changes saved");
                    return Ok(rows);
                }
                SaveAttempt::ConflictRetry(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.retry_attempts,
                        error = %err,
                        "Save attempt failed with a concurrency conflict"
                    );
                    last_conflict = Some(err);
                }
                SaveAttempt::Fatal(err) => return Err(err),
            }
        }

        Err(Error::RetryExhausted {
            attempts: self.retry_attempts,
            last: last_conflict.unwrap_or_else(|| {
                StoreError::concurrency(StoreOperation::Save, "no save attempt was made")
            }),
        })
    }

    async fn attempt_save(&self, token: Option<&CancellationToken>) -> SaveAttempt {
        match guarded(token, self.context.save_changes()).await {
            Ok(rows) => SaveAttempt::Saved(rows),
            Err(Error::ConcurrencyConflict(err)) => SaveAttempt::ConflictRetry(err),
            Err(err) => SaveAttempt::Fatal(err),
        }
    }
}

impl<C> std::fmt::Debug for Repository<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("retry_attempts", &self.retry_attempts)
            .field("state_actions", &self.state_actions)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

fn require<V>(value: Option<V>, param: &'static str) -> Result<V> {
    value.ok_or(Error::NullArgument { param })
}

fn require_non_empty<T>(entities: Option<Vec<T>>, verb: &str) -> Result<Vec<T>> {
    let entities = require(entities, "entities")?;
    if entities.is_empty() {
        return Err(Error::invalid_argument(
            "entities",
            format!("Cannot {} an empty collection.", verb),
        ));
    }
    Ok(entities)
}

fn resolve<T: Entity>(specification: Option<&Specification<T>>) -> Result<Query<T>> {
    require(specification, "specification").map(Query::from_specification)
}

fn restored<T: Entity>(mut entity: T, param: &'static str) -> Result<T> {
    match entity.as_soft_deletable_mut() {
        Some(soft) => soft.restore(),
        None => {
            return Err(Error::invalid_argument(
                param,
                format!("{} does not support soft delete.", T::NAME),
            ))
        }
    }
    Ok(entity)
}
