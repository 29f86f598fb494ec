//! Modifier pipeline
//!
//! Modifiers are the non-filter parts of a query: eager-load hints,
//! orderings, de-duplication and windows. They are kept in insertion order and
//! applied in that order.
//!
//! Orderings chain: an ordering appended directly after another ordering is a
//! THEN BY continuation of it, anything else starts a new primary ORDER BY.
//! The pipeline records this with an explicit flag rather than by looking at
//! the previous modifier.

use std::collections::HashSet;
use std::fmt;

use super::expression::OrderDirection;
use super::value::Value;
use crate::context::Entity;

/// Whether an ordering starts a new sort or continues the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChain {
    /// ORDER BY
    Primary,
    /// THEN BY
    Then,
}

/// Skip/take window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Rows to skip
    pub skip: u64,
    /// Rows to take after skipping
    pub take: u64,
}

impl PageWindow {
    /// Create a window
    pub const fn new(skip: u64, take: u64) -> Self {
        Self { skip, take }
    }

    /// Window selecting a 0-based page
    pub const fn page(page: u64, page_size: u64) -> Self {
        Self {
            skip: page.saturating_mul(page_size),
            take: page_size,
        }
    }

    /// Apply `next` to the rows this window already selected
    pub fn then(self, next: PageWindow) -> PageWindow {
        PageWindow {
            skip: self.skip.saturating_add(next.skip),
            take: self.take.saturating_sub(next.skip).min(next.take),
        }
    }
}

/// A named transformation of a sequence of entities
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Eager-load a navigation path
    Include(String),
    /// Sort by a field
    OrderBy {
        /// Field to sort by
        field: String,
        /// Sort direction
        direction: OrderDirection,
        /// Primary sort or continuation
        chain: OrderChain,
    },
    /// Remove duplicate entities
    Distinct,
    /// Keep the first entity for each value of a field
    DistinctBy(String),
    /// Skip/take window
    Window(PageWindow),
}

impl Modifier {
    /// Short name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Include(_) => "include",
            Self::OrderBy {
                chain: OrderChain::Primary,
                ..
            } => "order_by",
            Self::OrderBy {
                chain: OrderChain::Then,
                ..
            } => "then_by",
            Self::Distinct => "distinct",
            Self::DistinctBy(_) => "distinct_by",
            Self::Window(_) => "window",
        }
    }

    /// Whether this is an ordering
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::OrderBy { .. })
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include(path) => write!(f, "include({})", path),
            Self::OrderBy {
                field, direction, ..
            } => write!(f, "{}({} {})", self.name(), field, direction),
            Self::Distinct => write!(f, "distinct"),
            Self::DistinctBy(field) => write!(f, "distinct_by({})", field),
            Self::Window(w) => write!(f, "window(skip {}, take {})", w.skip, w.take),
        }
    }
}

/// Ordered list of modifiers with the builder rules applied on append
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifierPipeline {
    modifiers: Vec<Modifier>,
    last_was_ordering: bool,
    is_distinct: bool,
}

impl ModifierPipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an eager-load hint
    pub fn include(&mut self, path: impl Into<String>) {
        self.append(Modifier::Include(path.into()));
    }

    /// Append an ordering, chained as THEN BY if the previous modifier was one
    pub fn order(&mut self, field: impl Into<String>, direction: OrderDirection) {
        let chain = if self.last_was_ordering {
            OrderChain::Then
        } else {
            OrderChain::Primary
        };
        self.append(Modifier::OrderBy {
            field: field.into(),
            direction,
            chain,
        });
    }

    /// Append whole-entity de-duplication; returns false if already distinct
    pub fn distinct(&mut self) -> bool {
        if self.is_distinct {
            return false;
        }
        self.is_distinct = true;
        self.append(Modifier::Distinct);
        true
    }

    /// Append per-field de-duplication; returns false if already distinct
    pub fn distinct_by(&mut self, field: impl Into<String>) -> bool {
        if self.is_distinct {
            return false;
        }
        self.is_distinct = true;
        self.append(Modifier::DistinctBy(field.into()));
        true
    }

    /// Append a skip/take window
    pub fn window(&mut self, window: PageWindow) {
        self.append(Modifier::Window(window));
    }

    /// Replay a modifier through the builder rules
    ///
    /// Orderings are re-chained against this pipeline's state and a second
    /// distinct is dropped.
    pub fn push(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::Include(path) => self.include(path),
            Modifier::OrderBy {
                field, direction, ..
            } => self.order(field, direction),
            Modifier::Distinct => {
                self.distinct();
            }
            Modifier::DistinctBy(field) => {
                self.distinct_by(field);
            }
            Modifier::Window(w) => self.window(w),
        }
    }

    /// Replay every modifier of `other` after this pipeline's own
    pub fn extend_from(&mut self, other: &ModifierPipeline) {
        for modifier in &other.modifiers {
            self.push(modifier.clone());
        }
    }

    fn append(&mut self, modifier: Modifier) {
        self.last_was_ordering = modifier.is_ordering();
        self.modifiers.push(modifier);
    }

    /// Modifiers in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Modifier> {
        self.modifiers.iter()
    }

    /// Number of modifiers
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Whether the pipeline is empty
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Whether a distinct modifier has been applied
    pub fn is_distinct(&self) -> bool {
        self.is_distinct
    }

    /// Eager-load paths in insertion order
    pub fn includes(&self) -> Vec<&str> {
        self.modifiers
            .iter()
            .filter_map(|m| match m {
                Modifier::Include(path) => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Apply every modifier, in order, to already-filtered rows
    ///
    /// Sorting is stable. A primary ordering discards earlier sort keys, a
    /// THEN BY adds a key to the current group.
    pub fn apply<T: Entity>(&self, mut rows: Vec<T>) -> Vec<T> {
        let mut sort_keys: Vec<(&str, OrderDirection)> = Vec::new();

        for modifier in &self.modifiers {
            match modifier {
                Modifier::Include(_) => {}
                Modifier::OrderBy {
                    field,
                    direction,
                    chain,
                } => {
                    if *chain == OrderChain::Primary {
                        sort_keys.clear();
                    }
                    sort_keys.push((field.as_str(), *direction));
                    rows.sort_by(|a, b| {
                        sort_keys
                            .iter()
                            .map(|(field, direction)| {
                                let ord = a
                                    .field(field)
                                    .unwrap_or(Value::Null)
                                    .sort_cmp(&b.field(field).unwrap_or(Value::Null));
                                match direction {
                                    OrderDirection::Ascending => ord,
                                    OrderDirection::Descending => ord.reverse(),
                                }
                            })
                            .find(|o| o.is_ne())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                }
                Modifier::Distinct => {
                    let mut seen = HashSet::new();
                    rows.retain(|row| seen.insert(row.key()));
                }
                Modifier::DistinctBy(field) => {
                    let mut seen: Vec<Value> = Vec::new();
                    rows.retain(|row| {
                        let value = row.field(field).unwrap_or(Value::Null);
                        if seen.iter().any(|v| v.loosely_eq(&value)) {
                            false
                        } else {
                            seen.push(value);
                            true
                        }
                    });
                }
                Modifier::Window(w) => {
                    rows = rows
                        .into_iter()
                        .skip(usize::try_from(w.skip).unwrap_or(usize::MAX))
                        .take(usize::try_from(w.take).unwrap_or(usize::MAX))
                        .collect();
                }
            }
        }
        rows
    }
}

impl<'a> IntoIterator for &'a ModifierPipeline {
    type Item = &'a Modifier;
    type IntoIter = std::slice::Iter<'a, Modifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.modifiers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Item;

    fn items() -> Vec<Item> {
        vec![
            Item::new(1, "b", 20),
            Item::new(2, "a", 20),
            Item::new(3, "c", 10),
            Item::new(4, "a", 30),
        ]
    }

    fn ids(rows: &[Item]) -> Vec<i64> {
        rows.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_second_ordering_chains_as_then() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.order("price", OrderDirection::Ascending);
        pipeline.order("name", OrderDirection::Ascending);

        let names: Vec<&str> = pipeline.iter().map(Modifier::name).collect();
        assert_eq!(names, vec!["order_by", "then_by"]);
    }

    #[test]
    fn test_ordering_after_other_modifier_is_primary() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.order("price", OrderDirection::Ascending);
        pipeline.include("tags");
        pipeline.order("name", OrderDirection::Ascending);

        let names: Vec<&str> = pipeline.iter().map(Modifier::name).collect();
        assert_eq!(names, vec!["order_by", "include", "order_by"]);
    }

    #[test]
    fn test_distinct_is_idempotent() {
        let mut pipeline = ModifierPipeline::new();
        assert!(pipeline.distinct());
        assert!(!pipeline.distinct());
        assert!(!pipeline.distinct_by("name"));
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.is_distinct());
    }

    #[test]
    fn test_apply_order_then_by() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.order("price", OrderDirection::Ascending);
        pipeline.order("name", OrderDirection::Descending);

        assert_eq!(ids(&pipeline.apply(items())), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_new_primary_ordering_replaces_previous_keys() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.order("price", OrderDirection::Descending);
        pipeline.include("tags");
        pipeline.order("name", OrderDirection::Ascending);

        // stable sort on name keeps the price-descending order among ties
        assert_eq!(ids(&pipeline.apply(items())), vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_apply_distinct_by_keeps_first() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.distinct_by("price");

        assert_eq!(ids(&pipeline.apply(items())), vec![1, 3, 4]);
    }

    #[test]
    fn test_apply_distinct_by_key() {
        let mut rows = items();
        rows.push(Item::new(1, "b", 20));
        let mut pipeline = ModifierPipeline::new();
        pipeline.distinct();

        assert_eq!(ids(&pipeline.apply(rows)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_apply_window() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.order("id", OrderDirection::Ascending);
        pipeline.window(PageWindow::page(1, 3));

        assert_eq!(ids(&pipeline.apply(items())), vec![4]);
    }

    #[test]
    fn test_window_composition() {
        let combined = PageWindow::new(10, 20).then(PageWindow::new(5, 10));
        assert_eq!(combined, PageWindow::new(15, 10));

        let past_end = PageWindow::new(0, 2).then(PageWindow::new(5, 10));
        assert_eq!(past_end.take, 0);
    }

    #[test]
    fn test_extend_from_rechains_and_dedupes() {
        let mut left = ModifierPipeline::new();
        left.order("price", OrderDirection::Ascending);
        left.distinct();

        let mut right = ModifierPipeline::new();
        right.order("name", OrderDirection::Ascending);
        right.distinct();

        left.extend_from(&right);
        let names: Vec<&str> = left.iter().map(Modifier::name).collect();
        assert_eq!(names, vec!["order_by", "distinct", "order_by"]);
    }

    #[test]
    fn test_includes() {
        let mut pipeline = ModifierPipeline::new();
        pipeline.include("owner");
        pipeline.order("id", OrderDirection::Ascending);
        pipeline.include("owner.address");
        assert_eq!(pipeline.includes(), vec!["owner", "owner.address"]);
    }
}
