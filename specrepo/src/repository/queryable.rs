//! Resolved query handle passed to repository resolvers

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::{DataContext, Entity, StoreResult};
use crate::error::{Error, Result};
use crate::specification::{PageWindow, Query};

/// Race a store call against an optional cancellation token
pub(crate) async fn guarded<V>(
    token: Option<&CancellationToken>,
    call: impl Future<Output = StoreResult<V>>,
) -> Result<V> {
    match token {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = call => result.map_err(Error::from),
            }
        }
        None => call.await.map_err(Error::from),
    }
}

/// A filtered and modified query bound to its context
///
/// Handed to the resolver of [`Repository::query`](super::Repository::query)
/// for aggregates, projections and existence checks.
pub struct Queryable<C, T> {
    context: Arc<C>,
    query: Query<T>,
    cancellation: Option<CancellationToken>,
}

impl<C: DataContext, T: Entity> Queryable<C, T> {
    pub(crate) fn new(
        context: Arc<C>,
        query: Query<T>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            context,
            query,
            cancellation,
        }
    }

    /// The resolved query
    pub fn query(&self) -> &Query<T> {
        &self.query
    }

    /// Restrict to a skip/take window
    #[must_use]
    pub fn window(mut self, skip: u64, take: u64) -> Self {
        self.query = self.query.with_window(PageWindow::new(skip, take));
        self
    }

    /// Every matching entity
    pub async fn to_list(&self) -> Result<Vec<T>> {
        guarded(self.cancellation.as_ref(), self.context.fetch(&self.query)).await
    }

    /// The first matching entity
    pub async fn first(&self) -> Result<Option<T>> {
        let query = self.query.clone().with_window(PageWindow::new(0, 1));
        let rows = guarded(self.cancellation.as_ref(), self.context.fetch(&query)).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of matching entities
    pub async fn count(&self) -> Result<u64> {
        guarded(self.cancellation.as_ref(), self.context.count(&self.query, None)).await
    }

    /// Number of matching entities with a non-null `column`
    pub async fn count_by(&self, column: &str) -> Result<u64> {
        guarded(
            self.cancellation.as_ref(),
            self.context.count(&self.query, Some(column)),
        )
        .await
    }

    /// Whether anything matches
    pub async fn any(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Project every matching entity
    pub async fn select<U>(&self, projection: impl FnMut(T) -> U) -> Result<Vec<U>> {
        Ok(self.to_list().await?.into_iter().map(projection).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryContext, MemoryStore};
    use crate::specification::{Predicate, Specification};
    use crate::testing::Item;

    fn context() -> Arc<MemoryContext> {
        let mut owned = Item::new(2, "gadget", 15);
        owned.owner = Some("ana".into());

        let store = MemoryStore::new();
        store
            .seed(vec![Item::new(1, "widget", 5), owned, Item::new(3, "gizmo", 25)])
            .unwrap();
        Arc::new(MemoryContext::new(store))
    }

    fn queryable(spec: &Specification<Item>) -> Queryable<MemoryContext, Item> {
        Queryable::new(context(), Query::from_specification(spec), None)
    }

    #[tokio::test]
    async fn test_to_list_applies_filter_and_ordering() {
        let spec = Specification::new(Predicate::<Item>::gt("price", 10_i64))
            .with_order_by_descending("price");
        let ids: Vec<i64> = queryable(&spec)
            .to_list()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_first_takes_the_leading_row() {
        let spec = Specification::<Item>::all().with_order_by_descending("price");
        let first = queryable(&spec).first().await.unwrap();
        assert_eq!(first.map(|item| item.id), Some(3));
    }

    #[tokio::test]
    async fn test_first_of_empty_result_is_none() {
        let spec = Specification::new(Predicate::<Item>::gt("price", 100_i64));
        assert!(queryable(&spec).first().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_by_skips_null_column() {
        let all = queryable(&Specification::all());
        assert_eq!(all.count().await.unwrap(), 3);
        assert_eq!(all.count_by("owner").await.unwrap(), 1);
        assert_eq!(all.count_by("name").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_any() {
        assert!(queryable(&Specification::all()).any().await.unwrap());

        let none = Specification::new(Predicate::<Item>::eq("name", "sprocket"));
        assert!(!queryable(&none).any().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_the_call() {
        let token = CancellationToken::new();
        token.cancel();
        let cancelled = Queryable::new(
            context(),
            Query::from_specification(&Specification::<Item>::all()),
            Some(token),
        );

        assert!(matches!(cancelled.any().await, Err(Error::Cancelled)));
        assert!(matches!(cancelled.to_list().await, Err(Error::Cancelled)));
        assert!(matches!(cancelled.first().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_window_narrows_later_calls() {
        let spec = Specification::<Item>::all().with_order_by("id");
        let windowed = queryable(&spec).window(1, 2);

        let names = windowed.select(|item| item.name).await.unwrap();
        assert_eq!(names, vec!["gadget".to_string(), "gizmo".to_string()]);
        assert_eq!(windowed.count().await.unwrap(), 2);
        assert_eq!(windowed.first().await.unwrap().map(|item| item.id), Some(2));
    }
}
