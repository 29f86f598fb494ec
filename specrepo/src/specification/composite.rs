//! Composite specifications
//!
//! AND, OR and NOT over other specifications. Operands are kept as-is and
//! their predicates are only combined when the composite is evaluated, so a
//! composite stays an inspectable expression tree.
//!
//! Converting a composite into a [`Specification`] merges the operands'
//! query shape: left's modifiers followed by right's replayed through the
//! builder rules, the OR of the no-tracking flags and the union of the tags.
//! NOT keeps its operand's shape unchanged.

use std::sync::Arc;

use super::expression::Predicate;
use super::spec::{Criterion, Specification};
use crate::context::Entity;
use crate::error::{Error, Result};

fn require_operand<T: Entity>(
    operand: Option<Specification<T>>,
    param: &'static str,
) -> Result<Specification<T>> {
    operand.ok_or_else(|| Error::invalid_argument(param, "Specification operand is required."))
}

fn merge_tags(left: &[String], right: &[String]) -> Vec<String> {
    let mut tags = left.to_vec();
    for tag in right {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Both operands must hold
pub struct AndSpecification<T: Entity> {
    left: Specification<T>,
    right: Specification<T>,
}

impl<T: Entity> AndSpecification<T> {
    /// Combine two specifications
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming `left_spec` or `right_spec` when an operand is
    /// absent.
    pub fn new(
        left: impl Into<Option<Specification<T>>>,
        right: impl Into<Option<Specification<T>>>,
    ) -> Result<Self> {
        let left = require_operand(left.into(), "left_spec")?;
        let right = require_operand(right.into(), "right_spec")?;
        Ok(Self::from_operands(left, right))
    }

    pub(crate) fn from_operands(left: Specification<T>, right: Specification<T>) -> Self {
        Self { left, right }
    }

    /// Left operand
    pub fn left(&self) -> &Specification<T> {
        &self.left
    }

    /// Right operand
    pub fn right(&self) -> &Specification<T> {
        &self.right
    }
}

impl<T: Entity> Criterion<T> for AndSpecification<T> {
    fn evaluate(&self) -> Predicate<T> {
        self.left.evaluate().and(self.right.evaluate())
    }
}

impl<T: Entity> From<AndSpecification<T>> for Specification<T> {
    fn from(spec: AndSpecification<T>) -> Self {
        let mut modifiers = spec.left.modifiers().clone();
        modifiers.extend_from(spec.right.modifiers());
        let no_tracking = spec.left.is_no_tracking() || spec.right.is_no_tracking();
        let tags = merge_tags(spec.left.tags(), spec.right.tags());
        Specification::from_parts(Arc::new(spec), modifiers, no_tracking, tags)
    }
}

/// At least one operand must hold
pub struct OrSpecification<T: Entity> {
    left: Specification<T>,
    right: Specification<T>,
}

impl<T: Entity> OrSpecification<T> {
    /// Combine two specifications
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming `left_spec` or `right_spec` when an operand is
    /// absent.
    pub fn new(
        left: impl Into<Option<Specification<T>>>,
        right: impl Into<Option<Specification<T>>>,
    ) -> Result<Self> {
        let left = require_operand(left.into(), "left_spec")?;
        let right = require_operand(right.into(), "right_spec")?;
        Ok(Self::from_operands(left, right))
    }

    pub(crate) fn from_operands(left: Specification<T>, right: Specification<T>) -> Self {
        Self { left, right }
    }

    /// Left operand
    pub fn left(&self) -> &Specification<T> {
        &self.left
    }

    /// Right operand
    pub fn right(&self) -> &Specification<T> {
        &self.right
    }
}

impl<T: Entity> Criterion<T> for OrSpecification<T> {
    fn evaluate(&self) -> Predicate<T> {
        self.left.evaluate().or(self.right.evaluate())
    }
}

impl<T: Entity> From<OrSpecification<T>> for Specification<T> {
    fn from(spec: OrSpecification<T>) -> Self {
        let mut modifiers = spec.left.modifiers().clone();
        modifiers.extend_from(spec.right.modifiers());
        let no_tracking = spec.left.is_no_tracking() || spec.right.is_no_tracking();
        let tags = merge_tags(spec.left.tags(), spec.right.tags());
        Specification::from_parts(Arc::new(spec), modifiers, no_tracking, tags)
    }
}

/// The operand must not hold
pub struct NotSpecification<T: Entity> {
    inner: Specification<T>,
}

impl<T: Entity> NotSpecification<T> {
    /// Negate a specification
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming `spec` when the operand is absent.
    pub fn new(spec: impl Into<Option<Specification<T>>>) -> Result<Self> {
        let inner = require_operand(spec.into(), "spec")?;
        Ok(Self::from_operand(inner))
    }

    pub(crate) fn from_operand(inner: Specification<T>) -> Self {
        Self { inner }
    }

    /// The negated specification
    pub fn inner(&self) -> &Specification<T> {
        &self.inner
    }
}

impl<T: Entity> Criterion<T> for NotSpecification<T> {
    fn evaluate(&self) -> Predicate<T> {
        self.inner.evaluate().negate()
    }
}

impl<T: Entity> From<NotSpecification<T>> for Specification<T> {
    fn from(spec: NotSpecification<T>) -> Self {
        let modifiers = spec.inner.modifiers().clone();
        let no_tracking = spec.inner.is_no_tracking();
        let tags = spec.inner.tags().to_vec();
        Specification::from_parts(Arc::new(spec), modifiers, no_tracking, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::Modifier;
    use crate::testing::Item;

    fn cheap() -> Specification<Item> {
        Specification::new(Predicate::lt("price", 10_i64))
    }

    fn named_g() -> Specification<Item> {
        Specification::new(Predicate::like("name", "g%"))
    }

    #[test]
    fn test_missing_operands_are_rejected() {
        let err = AndSpecification::new(None, cheap()).err();
        assert!(matches!(
            err,
            Some(Error::InvalidArgument { param: "left_spec", .. })
        ));

        let err = OrSpecification::new(cheap(), None).err();
        assert!(matches!(
            err,
            Some(Error::InvalidArgument { param: "right_spec", .. })
        ));

        let err = NotSpecification::<Item>::new(None).err();
        assert!(matches!(
            err,
            Some(Error::InvalidArgument { param: "spec", .. })
        ));
    }

    #[test]
    fn test_explicit_constructors_evaluate() {
        let item = Item::new(1, "gear", 5);
        let and = Specification::from(AndSpecification::new(cheap(), named_g()).unwrap());
        let or = Specification::from(OrSpecification::new(cheap(), named_g()).unwrap());
        let not = Specification::from(NotSpecification::new(cheap()).unwrap());

        assert!(and.is_satisfied_by(&item));
        assert!(or.is_satisfied_by(&item));
        assert!(!not.is_satisfied_by(&item));
    }

    #[test]
    fn test_operands_are_accessible() {
        let and = AndSpecification::new(cheap(), named_g()).unwrap();
        assert!(and.left().is_satisfied_by(&Item::new(1, "x", 1)));
        assert!(and.right().is_satisfied_by(&Item::new(1, "g", 100)));
    }

    #[test]
    fn test_merge_unions_modifiers_tracking_and_tags() {
        let left = cheap()
            .with_order_by("price")
            .with_distinct()
            .with_tag("a");
        let right = named_g()
            .with_order_by("name")
            .with_distinct()
            .with_tag("a")
            .with_tag("b")
            .no_tracking();

        let merged = left & right;
        let names: Vec<&str> = merged.modifiers().iter().map(Modifier::name).collect();
        assert_eq!(names, vec!["order_by", "distinct", "order_by"]);
        assert!(merged.is_no_tracking());
        assert_eq!(merged.tags(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_merge_rechains_adjacent_orderings() {
        let merged = cheap().with_order_by("price") | named_g().with_order_by("name");
        let names: Vec<&str> = merged.modifiers().iter().map(Modifier::name).collect();
        assert_eq!(names, vec!["order_by", "then_by"]);
    }

    #[test]
    fn test_not_keeps_operand_shape() {
        let negated = !cheap().with_include("owner").with_tag("t").no_tracking();
        assert_eq!(negated.modifiers().includes(), vec!["owner"]);
        assert!(negated.is_no_tracking());
        assert!(negated.has_tag("t"));
    }

    #[test]
    fn test_nested_composition_is_lazy_tree() {
        let spec = (cheap() | named_g()) & !Specification::new(Predicate::<Item>::eq("id", 3_i64));
        assert_eq!(
            spec.evaluate().to_string(),
            "((price < 10 OR name LIKE g%) AND NOT id = 3)"
        );
        assert!(!spec.is_satisfied_by(&Item::new(3, "gear", 1)));
        assert!(spec.is_satisfied_by(&Item::new(4, "gear", 100)));
    }
}
