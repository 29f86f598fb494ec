//! Paged query results

use serde::Serialize;

/// One page of a query's results
///
/// `page` is 0-based. `page_count` is derived from the total: a result set
/// smaller than one page, including an empty one, still has one page.
///
/// # Example
///
/// ```rust
/// use specrepo::repository::PagedResult;
///
/// let page = PagedResult::new(0, 50, 100, vec!["a", "b"]);
/// assert_eq!(page.page_count, 2);
///
/// let small = PagedResult::<&str>::new(0, 200, 1, vec![]);
/// assert_eq!(small.page_count, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    /// Entities on this page
    pub items: Vec<T>,
    /// 0-based page index
    pub page: i64,
    /// Requested page size
    pub page_size: i64,
    /// Matches across every page
    pub total_records: i64,
    /// Number of pages
    pub page_count: i64,
}

impl<T> PagedResult<T> {
    /// Build a page, deriving the page count
    pub fn new(page: i64, page_size: i64, total_records: i64, items: Vec<T>) -> Self {
        Self {
            page_count: page_count(total_records, page_size),
            items,
            page,
            page_size,
            total_records,
        }
    }

    /// Whether another page follows this one
    pub fn has_next(&self) -> bool {
        self.page
            .checked_add(1)
            .is_some_and(|next| next < self.page_count)
    }

    /// Whether a page precedes this one
    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    /// Transform the items, keeping the paging numbers
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_records: self.total_records,
            page_count: self.page_count,
        }
    }
}

fn page_count(total_records: i64, page_size: i64) -> i64 {
    if page_size <= 0 || total_records < page_size {
        return 1;
    }
    total_records / page_size + i64::from(total_records % page_size != 0)
}
