//! Specifications
//!
//! A [`Specification<T>`] bundles a filter criterion with the modifiers,
//! tracking flag and tags that shape a query. It is built once with the
//! fluent methods and handed to the repository, which reads it without ever
//! mutating it.
//!
//! # Example
//!
//! ```rust,ignore
//! use specrepo::specification::{Predicate, Specification};
//!
//! let mut recent = Specification::new(Predicate::<Order>::gte("placed_on", cutoff));
//! recent.include("lines").order_by_descending("placed_on").as_no_tracking();
//!
//! let open = Specification::new(Predicate::<Order>::eq("status", "open"));
//! let orders = repository.list(&(recent & open)).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use super::composite::{AndSpecification, NotSpecification, OrSpecification};
use super::expression::{OrderDirection, Predicate};
use super::modifier::{ModifierPipeline, PageWindow};
use crate::context::Entity;

/// Source of a specification's filter
///
/// Leaf specifications implement this to describe which entities they
/// select. The returned predicate must be deterministic and free of side
/// effects.
pub trait Criterion<T>: Send + Sync {
    /// Build the filter expression
    fn evaluate(&self) -> Predicate<T>;
}

impl<T> Criterion<T> for Predicate<T> {
    fn evaluate(&self) -> Predicate<T> {
        self.clone()
    }
}

/// Filter, modifiers, tracking flag and tags for a query over `T`
pub struct Specification<T: Entity> {
    criterion: Arc<dyn Criterion<T>>,
    modifiers: ModifierPipeline,
    no_tracking: bool,
    tags: Vec<String>,
}

impl<T: Entity> Specification<T> {
    /// Specification over a criterion with no modifiers
    pub fn new(criterion: impl Criterion<T> + 'static) -> Self {
        Self::from_parts(Arc::new(criterion), ModifierPipeline::new(), false, Vec::new())
    }

    /// Specification matching every entity
    pub fn all() -> Self {
        Self::new(Predicate::always())
    }

    pub(crate) fn from_parts(
        criterion: Arc<dyn Criterion<T>>,
        modifiers: ModifierPipeline,
        no_tracking: bool,
        tags: Vec<String>,
    ) -> Self {
        Self {
            criterion,
            modifiers,
            no_tracking,
            tags,
        }
    }

    /// Build the filter predicate
    pub fn evaluate(&self) -> Predicate<T> {
        self.criterion.evaluate()
    }

    /// Whether a single candidate passes the filter
    pub fn is_satisfied_by(&self, candidate: &T) -> bool {
        let check = self.evaluate().compile();
        check(candidate)
    }

    /// Alias of [`is_satisfied_by`](Self::is_satisfied_by)
    pub fn satisfies(&self, candidate: &T) -> bool {
        self.is_satisfied_by(candidate)
    }

    /// The modifiers in insertion order
    pub fn modifiers(&self) -> &ModifierPipeline {
        &self.modifiers
    }

    /// Whether distinct or distinct-by has been applied
    pub fn is_distinct(&self) -> bool {
        self.modifiers.is_distinct()
    }

    /// Whether queries built from this specification skip change tracking
    pub fn is_no_tracking(&self) -> bool {
        self.no_tracking
    }

    /// Tags attached with [`add_tag`](Self::add_tag)
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether a tag has been attached
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Filter and modify rows in memory
    pub fn apply(&self, rows: impl IntoIterator<Item = T>) -> Vec<T> {
        let check = self.evaluate().compile();
        let filtered = rows.into_iter().filter(|row| check(row)).collect();
        self.modifiers.apply(filtered)
    }

    /// Eager-load a navigation path
    pub fn include(&mut self, path: impl Into<String>) -> &mut Self {
        self.modifiers.include(path);
        self
    }

    /// Sort ascending; continues the previous ordering if it was the last call
    pub fn order_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.modifiers.order(field, OrderDirection::Ascending);
        self
    }

    /// Sort descending; continues the previous ordering if it was the last call
    pub fn order_by_descending(&mut self, field: impl Into<String>) -> &mut Self {
        self.modifiers.order(field, OrderDirection::Descending);
        self
    }

    /// Remove duplicate entities; no-op once distinct
    pub fn distinct(&mut self) -> &mut Self {
        self.modifiers.distinct();
        self
    }

    /// Keep the first entity per value of `field`; no-op once distinct
    pub fn distinct_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.modifiers.distinct_by(field);
        self
    }

    /// Restrict to a skip/take window
    pub fn window(&mut self, skip: u64, take: u64) -> &mut Self {
        self.modifiers.window(PageWindow::new(skip, take));
        self
    }

    /// Skip change tracking for queries built from this specification
    pub fn as_no_tracking(&mut self) -> &mut Self {
        self.no_tracking = true;
        self
    }

    /// Alias of [`as_no_tracking`](Self::as_no_tracking)
    pub fn with_no_tracking(&mut self) -> &mut Self {
        self.as_no_tracking()
    }

    /// Attach a free-form tag; blank tags and duplicates are ignored
    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        let tag = tag.into();
        if !tag.trim().is_empty() && !self.has_tag(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Owning form of [`include`](Self::include)
    #[must_use]
    pub fn with_include(mut self, path: impl Into<String>) -> Self {
        self.include(path);
        self
    }

    /// Owning form of [`order_by`](Self::order_by)
    #[must_use]
    pub fn with_order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by(field);
        self
    }

    /// Owning form of [`order_by_descending`](Self::order_by_descending)
    #[must_use]
    pub fn with_order_by_descending(mut self, field: impl Into<String>) -> Self {
        self.order_by_descending(field);
        self
    }

    /// Owning form of [`distinct`](Self::distinct)
    #[must_use]
    pub fn with_distinct(mut self) -> Self {
        self.distinct();
        self
    }

    /// Owning form of [`distinct_by`](Self::distinct_by)
    #[must_use]
    pub fn with_distinct_by(mut self, field: impl Into<String>) -> Self {
        self.distinct_by(field);
        self
    }

    /// Owning form of [`add_tag`](Self::add_tag)
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tag(tag);
        self
    }

    /// Owning form of [`as_no_tracking`](Self::as_no_tracking)
    #[must_use]
    pub fn no_tracking(mut self) -> Self {
        self.as_no_tracking();
        self
    }

    /// Both specifications must hold
    #[must_use]
    pub fn and(self, other: Specification<T>) -> Specification<T> {
        AndSpecification::from_operands(self, other).into()
    }

    /// Either specification must hold
    #[must_use]
    pub fn or(self, other: Specification<T>) -> Specification<T> {
        OrSpecification::from_operands(self, other).into()
    }

    /// This specification must not hold
    #[must_use]
    pub fn negate(self) -> Specification<T> {
        NotSpecification::from_operand(self).into()
    }
}

impl<T: Entity> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            criterion: Arc::clone(&self.criterion),
            modifiers: self.modifiers.clone(),
            no_tracking: self.no_tracking,
            tags: self.tags.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("entity", &T::NAME)
            .field("expression", self.evaluate().expression())
            .field("modifiers", &self.modifiers)
            .field("no_tracking", &self.no_tracking)
            .field("tags", &self.tags)
            .finish()
    }
}

impl<T: Entity> From<Predicate<T>> for Specification<T> {
    fn from(predicate: Predicate<T>) -> Self {
        Self::new(predicate)
    }
}

impl<T: Entity> std::ops::BitAnd for Specification<T> {
    type Output = Specification<T>;

    fn bitand(self, rhs: Specification<T>) -> Specification<T> {
        self.and(rhs)
    }
}

impl<T: Entity> std::ops::BitOr for Specification<T> {
    type Output = Specification<T>;

    fn bitor(self, rhs: Specification<T>) -> Specification<T> {
        self.or(rhs)
    }
}

impl<T: Entity> std::ops::Not for Specification<T> {
    type Output = Specification<T>;

    fn not(self) -> Specification<T> {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::Modifier;
    use crate::testing::Item;

    struct CheaperThan(i64);

    impl Criterion<Item> for CheaperThan {
        fn evaluate(&self) -> Predicate<Item> {
            Predicate::lt("price", self.0)
        }
    }

    fn sample() -> Vec<Item> {
        vec![
            Item::new(1, "widget", 5),
            Item::new(2, "gadget", 15),
            Item::new(3, "gizmo", 25),
        ]
    }

    #[test]
    fn test_custom_criterion() {
        let spec = Specification::new(CheaperThan(10));
        assert!(spec.is_satisfied_by(&Item::new(1, "a", 9)));
        assert!(!spec.satisfies(&Item::new(1, "a", 10)));
    }

    #[test]
    fn test_boolean_algebra_matches_operands() {
        let a = Specification::new(CheaperThan(20));
        let b = Specification::new(Predicate::<Item>::like("name", "g%"));

        for item in sample() {
            let (ra, rb) = (a.is_satisfied_by(&item), b.is_satisfied_by(&item));
            assert_eq!((a.clone() & b.clone()).is_satisfied_by(&item), ra && rb);
            assert_eq!((a.clone() | b.clone()).is_satisfied_by(&item), ra || rb);
            assert_eq!((!a.clone()).is_satisfied_by(&item), !ra);
        }
    }

    #[test]
    fn test_fluent_builders() {
        let mut spec = Specification::<Item>::all();
        spec.order_by("price")
            .order_by_descending("name")
            .distinct()
            .distinct()
            .as_no_tracking()
            .add_tag("report");

        assert_eq!(spec.modifiers().len(), 3);
        assert!(spec.is_distinct());
        assert!(spec.is_no_tracking());
        assert!(spec.has_tag("report"));
        assert!(!spec.has_tag("other"));
    }

    #[test]
    fn test_owning_builders() {
        let spec = Specification::from(Predicate::<Item>::gt("price", 1_i64))
            .with_include("tags")
            .with_order_by("name")
            .with_tag("x")
            .with_tag("x")
            .no_tracking();
        assert_eq!(spec.modifiers().includes(), vec!["tags"]);
        assert_eq!(spec.tags(), ["x".to_string()]);
        assert!(spec.is_no_tracking());
    }

    #[test]
    fn test_blank_tags_are_ignored() {
        let mut spec = Specification::<Item>::all();
        spec.add_tag("").add_tag("   ").add_tag("\t").add_tag("audit");
        let spec = spec.with_tag(" ");

        assert_eq!(spec.tags(), ["audit".to_string()]);
        assert!(!spec.has_tag(""));
    }

    #[test]
    fn test_window_applies_where_it_was_added() {
        let mut ordered_first = Specification::<Item>::all();
        ordered_first.order_by_descending("price").window(1, 1);
        let ids: Vec<i64> = ordered_first.apply(sample()).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2]);

        let mut windowed_first = Specification::<Item>::all();
        windowed_first.window(0, 2).order_by_descending("price");
        let ids: Vec<i64> = windowed_first.apply(sample()).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(
            windowed_first.modifiers().iter().next(),
            Some(&Modifier::Window(PageWindow::new(0, 2)))
        );
    }

    #[test]
    fn test_apply_filters_then_modifies() {
        let spec = Specification::new(Predicate::<Item>::gt("price", 1_i64))
            .with_order_by_descending("price");
        let ids: Vec<i64> = spec.apply(sample()).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_debug_shows_expression() {
        let spec = Specification::new(Predicate::<Item>::eq("name", "widget"));
        let debug = format!("{:?}", spec);
        assert!(debug.contains("Specification"));
        assert!(debug.contains("widget"));
    }
}
