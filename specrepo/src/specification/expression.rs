//! Filter conditions and the predicate expression tree
//!
//! A [`Predicate<T>`] is an inspectable boolean expression over the fields of
//! `T`. It can be evaluated in memory against a single record, compiled into
//! a closure, or rendered to SQL by [`sql`](super::sql).
//!
//! # Example
//!
//! ```rust,ignore
//! use specrepo::specification::{FilterCondition, Predicate};
//!
//! let adults = Predicate::<User>::gte("age", 18_i64);
//! let active = Predicate::condition(FilterCondition::eq("status", "active"));
//! let predicate = adults.and(active);
//! assert!(predicate.is_satisfied_by(&user));
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::value::Value;
use crate::context::Record;

/// Direction for ordering results
///
/// ```rust
/// use specrepo::specification::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "ASC");
/// assert_eq!(format!("{}", OrderDirection::Descending), "DESC");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASC"),
            Self::Descending => write!(f, "DESC"),
        }
    }
}

/// Comparison operators for filter conditions
///
/// ```rust
/// use specrepo::specification::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::Equal), "=");
/// assert_eq!(format!("{}", FilterOperator::Like), "LIKE");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (<>)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching with `%` and `_` wildcards (LIKE)
    Like,
    /// Value is in a list (IN)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "<>"),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A single comparison between an entity field and a value
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: Value,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Create an equality filter (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Equal, value)
    }

    /// Create a not-equal filter (field <> value)
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value)
    }

    /// Create a greater-than filter (field > value)
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value)
    }

    /// Create a greater-than-or-equal filter (field >= value)
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value)
    }

    /// Create a less-than filter (field < value)
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::LessThan, value)
    }

    /// Create a less-than-or-equal filter (field <= value)
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value)
    }

    /// Create a pattern matching filter (field LIKE pattern)
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, Value::String(pattern.into()))
    }

    /// Create an IN filter (field IN (values...))
    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::new(field, FilterOperator::In, Value::from(values))
    }

    /// Create an IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, Value::Null)
    }

    /// Create an IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, Value::Null)
    }

    /// Evaluate the condition against a field value; a missing field is null
    ///
    /// An unknown outcome counts as not matching.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        self.truth(actual).unwrap_or(false)
    }

    /// Three-valued outcome as a SQL WHERE clause sees it
    ///
    /// `None` is SQL's unknown: a null field compared with `=`, `<`, `LIKE` or
    /// `IN`. Null tests and `<>` (rendered as `IS DISTINCT FROM`) are always
    /// definite.
    pub fn truth(&self, actual: Option<&Value>) -> Option<bool> {
        let actual = actual.unwrap_or(&Value::Null);
        let outcome = match self.operator {
            FilterOperator::IsNull => actual.is_null(),
            FilterOperator::IsNotNull => !actual.is_null(),
            FilterOperator::Equal if self.value.is_null() => actual.is_null(),
            FilterOperator::NotEqual if self.value.is_null() => !actual.is_null(),
            FilterOperator::NotEqual => actual.is_null() || !actual.loosely_eq(&self.value),
            _ if actual.is_null() => return None,
            FilterOperator::Equal => actual.loosely_eq(&self.value),
            FilterOperator::GreaterThan => actual.compare(&self.value).is_some_and(|o| o.is_gt()),
            FilterOperator::GreaterThanOrEqual => {
                actual.compare(&self.value).is_some_and(|o| o.is_ge())
            }
            FilterOperator::LessThan => actual.compare(&self.value).is_some_and(|o| o.is_lt()),
            FilterOperator::LessThanOrEqual => {
                actual.compare(&self.value).is_some_and(|o| o.is_le())
            }
            FilterOperator::Like => match (actual.as_str(), self.value.as_str()) {
                (Some(text), Some(pattern)) => like_match(text, pattern),
                _ => false,
            },
            FilterOperator::In => match &self.value {
                Value::List(items) => {
                    if items.iter().any(|item| actual.loosely_eq(item)) {
                        true
                    } else if items.iter().any(Value::is_null) {
                        return None;
                    } else {
                        false
                    }
                }
                single if single.is_null() => return None,
                single => actual.loosely_eq(single),
            },
        };
        Some(outcome)
    }
}

/// SQL LIKE matching: `%` matches any run, `_` matches one character
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

/// Boolean expression tree over filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant truth value
    Constant(bool),
    /// Leaf comparison
    Condition(FilterCondition),
    /// Both sides must hold
    And(Box<Expression>, Box<Expression>),
    /// Either side must hold
    Or(Box<Expression>, Box<Expression>),
    /// Negation
    Not(Box<Expression>),
}

impl Expression {
    /// Conjunction, folding constants
    pub fn and(self, other: Expression) -> Expression {
        match (self, other) {
            (Self::Constant(true), e) | (e, Self::Constant(true)) => e,
            (Self::Constant(false), _) | (_, Self::Constant(false)) => Self::Constant(false),
            (l, r) => Self::And(Box::new(l), Box::new(r)),
        }
    }

    /// Disjunction, folding constants
    pub fn or(self, other: Expression) -> Expression {
        match (self, other) {
            (Self::Constant(false), e) | (e, Self::Constant(false)) => e,
            (Self::Constant(true), _) | (_, Self::Constant(true)) => Self::Constant(true),
            (l, r) => Self::Or(Box::new(l), Box::new(r)),
        }
    }

    /// Negation, folding constants and double negation
    pub fn negate(self) -> Expression {
        match self {
            Self::Constant(b) => Self::Constant(!b),
            Self::Not(inner) => *inner,
            e => Self::Not(Box::new(e)),
        }
    }

    /// Evaluate against a record
    ///
    /// Nulls propagate the way they do in SQL: an unknown operand makes
    /// `NOT` unknown, and the whole expression holds only when it is
    /// definitely true.
    pub fn evaluate<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.truth(record).unwrap_or(false)
    }

    /// Three-valued evaluation against a record
    pub fn truth<R: Record + ?Sized>(&self, record: &R) -> Option<bool> {
        match self {
            Self::Constant(b) => Some(*b),
            Self::Condition(c) => c.truth(record.field(&c.field).as_ref()),
            Self::And(l, r) => match (l.truth(record), r.truth(record)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Self::Or(l, r) => match (l.truth(record), r.truth(record)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Self::Not(e) => e.truth(record).map(|b| !b),
        }
    }

    /// Leaf conditions in left-to-right order
    pub fn conditions(&self) -> Vec<&FilterCondition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a FilterCondition>) {
        match self {
            Self::Constant(_) => {}
            Self::Condition(c) => out.push(c),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_conditions(out);
                r.collect_conditions(out);
            }
            Self::Not(e) => e.collect_conditions(out),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(b) => write!(f, "{}", b),
            Self::Condition(c) => match c.operator {
                FilterOperator::IsNull | FilterOperator::IsNotNull => {
                    write!(f, "{} {}", c.field, c.operator)
                }
                op => write!(f, "{} {} {}", c.field, op, c.value),
            },
            Self::And(l, r) => write!(f, "({} AND {})", l, r),
            Self::Or(l, r) => write!(f, "({} OR {})", l, r),
            Self::Not(e) => write!(f, "NOT {}", e),
        }
    }
}

/// Typed predicate over entities of type `T`
pub struct Predicate<T> {
    expression: Expression,
    _entity: PhantomData<fn(&T) -> bool>,
}

impl<T> Predicate<T> {
    /// Wrap an expression tree
    pub fn from_expression(expression: Expression) -> Self {
        Self {
            expression,
            _entity: PhantomData,
        }
    }

    /// Predicate satisfied by every entity
    pub fn always() -> Self {
        Self::from_expression(Expression::Constant(true))
    }

    /// Predicate satisfied by no entity
    pub fn never() -> Self {
        Self::from_expression(Expression::Constant(false))
    }

    /// Predicate made of a single condition
    pub fn condition(condition: FilterCondition) -> Self {
        Self::from_expression(Expression::Condition(condition))
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::eq(field, value))
    }

    /// `field <> value`
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::ne(field, value))
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::gt(field, value))
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::gte(field, value))
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::lt(field, value))
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(FilterCondition::lte(field, value))
    }

    /// `field LIKE pattern`
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::condition(FilterCondition::like(field, pattern))
    }

    /// `field IN (values...)`
    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::condition(FilterCondition::is_in(field, values))
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::condition(FilterCondition::is_null(field))
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::condition(FilterCondition::is_not_null(field))
    }

    /// Conjunction with another predicate
    #[must_use]
    pub fn and(self, other: Predicate<T>) -> Self {
        Self::from_expression(self.expression.and(other.expression))
    }

    /// Disjunction with another predicate
    #[must_use]
    pub fn or(self, other: Predicate<T>) -> Self {
        Self::from_expression(self.expression.or(other.expression))
    }

    /// Negation
    #[must_use]
    pub fn negate(self) -> Self {
        Self::from_expression(self.expression.negate())
    }

    /// The expression tree
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Consume into the expression tree
    pub fn into_expression(self) -> Expression {
        self.expression
    }

    /// Whether the predicate is the constant `true`
    pub fn is_always(&self) -> bool {
        self.expression == Expression::Constant(true)
    }
}

impl<T: Record> Predicate<T> {
    /// Compile into an executable closure
    pub fn compile(&self) -> impl Fn(&T) -> bool + Send + Sync + 'static {
        let expression = self.expression.clone();
        move |candidate: &T| expression.evaluate(candidate)
    }

    /// Evaluate against a single candidate
    pub fn is_satisfied_by(&self, candidate: &T) -> bool {
        self.expression.evaluate(candidate)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_expression(self.expression.clone())
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.expression).finish()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl<T> std::ops::BitAnd for Predicate<T> {
    type Output = Predicate<T>;

    fn bitand(self, rhs: Predicate<T>) -> Predicate<T> {
        self.and(rhs)
    }
}

impl<T> std::ops::BitOr for Predicate<T> {
    type Output = Predicate<T>;

    fn bitor(self, rhs: Predicate<T>) -> Predicate<T> {
        self.or(rhs)
    }
}

impl<T> std::ops::Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Predicate<T> {
        self.negate()
    }
}
