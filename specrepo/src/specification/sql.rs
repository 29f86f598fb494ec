//! SQL rendering of resolved queries
//!
//! Writes a compiled predicate and its modifiers as a Postgres-flavoured
//! statement with positional parameters. The writer is target-agnostic: it
//! pushes SQL text and binds [`Value`]s through [`SqlWrite`], implemented by
//! [`SqlStatement`] (text plus parameter list) and, with the `database`
//! feature, by a wrapper around `sqlx::QueryBuilder<Postgres>`.
//!
//! Modifiers run in insertion order, so the statement is planned as a stack of
//! [`SelectLevel`]s: a new level wraps the previous one whenever SQL's fixed
//! DISTINCT / ORDER BY / LIMIT order inside one SELECT would differ from the
//! pipeline's. Adjacent windows fold into one LIMIT/OFFSET.
//!
//! # Example
//!
//! ```rust,ignore
//! let statement = Query::from_specification(&spec).to_sql("items");
//! assert_eq!(
//!     statement.sql(),
//!     r#"SELECT * FROM "items" WHERE "price" < $1 ORDER BY "name" ASC"#,
//! );
//! ```

use super::expression::{Expression, FilterCondition, FilterOperator, OrderDirection};
use super::modifier::{Modifier, ModifierPipeline, OrderChain, PageWindow};
use super::value::Value;

/// Sink for rendered SQL
pub trait SqlWrite {
    /// Append raw SQL text
    fn push(&mut self, sql: &str);
    /// Append a placeholder bound to `value`
    fn bind(&mut self, value: Value);
}

/// Rendered SQL text with its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlStatement {
    sql: String,
    params: Vec<Value>,
}

impl SqlStatement {
    /// SQL text with `$n` placeholders
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in placeholder order
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into text and parameters
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

impl SqlWrite for SqlStatement {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind(&mut self, value: Value) {
        self.params.push(value);
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
    }
}

/// Quote an identifier, keeping `schema.table` qualification
pub fn quote_ident(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Write a boolean expression
pub fn write_expression<W: SqlWrite + ?Sized>(w: &mut W, expression: &Expression) {
    match expression {
        Expression::Constant(true) => w.push("TRUE"),
        Expression::Constant(false) => w.push("FALSE"),
        Expression::Condition(condition) => write_condition(w, condition),
        Expression::And(l, r) => {
            w.push("(");
            write_expression(w, l);
            w.push(" AND ");
            write_expression(w, r);
            w.push(")");
        }
        Expression::Or(l, r) => {
            w.push("(");
            write_expression(w, l);
            w.push(" OR ");
            write_expression(w, r);
            w.push(")");
        }
        Expression::Not(e) => {
            w.push("NOT (");
            write_expression(w, e);
            w.push(")");
        }
    }
}

fn write_condition<W: SqlWrite + ?Sized>(w: &mut W, condition: &FilterCondition) {
    if let (FilterOperator::In, Value::List(items)) = (condition.operator, &condition.value) {
        if items.is_empty() {
            w.push("FALSE");
            return;
        }
    }
    w.push(&quote_ident(&condition.field));

    match (condition.operator, &condition.value) {
        (FilterOperator::IsNull, _) | (FilterOperator::Equal, Value::Null) => w.push(" IS NULL"),
        (FilterOperator::IsNotNull, _) | (FilterOperator::NotEqual, Value::Null) => {
            w.push(" IS NOT NULL")
        }
        // null-safe so a null column counts as "not equal", matching in-memory evaluation
        (FilterOperator::NotEqual, value) => {
            w.push(" IS DISTINCT FROM ");
            w.bind(value.clone());
        }
        (FilterOperator::In, Value::List(items)) => {
            w.push(" IN (");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.bind(item.clone());
            }
            w.push(")");
        }
        (FilterOperator::In, value) => {
            w.push(" = ");
            w.bind(value.clone());
        }
        (op, value) => {
            w.push(" ");
            w.push(&op.to_string());
            w.push(" ");
            w.bind(value.clone());
        }
    }
}

/// De-duplication applied by one SELECT level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistinctClause {
    /// `SELECT DISTINCT`
    Rows,
    /// `SELECT DISTINCT ON (field)`
    On(String),
}

/// One SELECT of a rendered query
///
/// Level 0 reads the table, every later level reads the previous one as a
/// subquery. Within a level SQL applies DISTINCT, then ORDER BY, then
/// LIMIT/OFFSET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectLevel {
    /// De-duplication, if any
    pub distinct: Option<DistinctClause>,
    /// Sort keys, most significant first
    pub order: Vec<(String, OrderDirection)>,
    /// Skip/take window
    pub window: Option<PageWindow>,
}

impl SelectLevel {
    fn is_trivial(&self) -> bool {
        self.distinct.is_none() && self.order.is_empty() && self.window.is_none()
    }
}

#[derive(Default)]
struct LevelPlanner {
    done: Vec<SelectLevel>,
    level: SelectLevel,
    // keys of the current ORDER BY / THEN BY group
    group: Vec<(String, OrderDirection)>,
    // order the rows had when the current group started
    inherited: Vec<(String, OrderDirection)>,
}

impl LevelPlanner {
    /// Order the rows currently have: the group, then earlier keys as tie-breaks
    fn effective(&self) -> Vec<(String, OrderDirection)> {
        let mut keys = self.group.clone();
        for key in &self.inherited {
            if !keys.iter().any(|(field, _)| *field == key.0) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Close the current level and read it as a subquery
    fn wrap(&mut self) {
        let order = self.effective();
        let closed = std::mem::replace(
            &mut self.level,
            SelectLevel {
                order,
                ..SelectLevel::default()
            },
        );
        self.done.push(closed);
    }

    fn order(&mut self, field: &str, direction: OrderDirection, chain: OrderChain) {
        let distinct_on = matches!(self.level.distinct, Some(DistinctClause::On(_)));
        if self.level.window.is_some() || distinct_on {
            self.wrap();
        }
        if chain == OrderChain::Primary {
            self.inherited = self.effective();
            self.group.clear();
        }
        self.group.push((field.to_string(), direction));
        self.level.order = self.effective();
    }

    fn distinct(&mut self, clause: DistinctClause) {
        if self.level.window.is_some() {
            self.wrap();
        }
        match clause {
            DistinctClause::Rows => self.level.distinct = Some(DistinctClause::Rows),
            DistinctClause::On(field) => {
                // DISTINCT ON keeps the first row per value, so its field leads
                // the ORDER BY and the current order picks the survivor
                let effective = self.effective();
                let direction = effective
                    .iter()
                    .find(|(f, _)| *f == field)
                    .map_or(OrderDirection::Ascending, |(_, d)| *d);
                let mut order = vec![(field.clone(), direction)];
                order.extend(effective.iter().filter(|(f, _)| *f != field).cloned());
                let reordered = order != effective;
                self.level.order = order;
                self.level.distinct = Some(DistinctClause::On(field));
                if reordered {
                    // restore the current order over the surviving rows
                    self.wrap();
                }
            }
        }
    }

    fn window(&mut self, window: PageWindow) {
        self.level.window = Some(match self.level.window {
            Some(previous) => previous.then(window),
            None => window,
        });
    }

    fn finish(mut self) -> Vec<SelectLevel> {
        let last = std::mem::take(&mut self.level);
        if self.done.is_empty() || !last.is_trivial() {
            self.done.push(last);
        }
        self.done
    }
}

/// Plan the SELECT levels that reproduce a modifier pipeline
///
/// A window followed by an ordering or distinct, and a distinct-on followed by
/// an ordering, start a new level reading the previous one. Earlier ordering
/// groups stay as trailing tie-break keys, matching the stable in-memory sort.
/// Include hints are not rendered.
pub fn plan_levels(modifiers: &ModifierPipeline) -> Vec<SelectLevel> {
    let mut planner = LevelPlanner::default();
    for modifier in modifiers {
        match modifier {
            Modifier::Include(_) => {}
            Modifier::OrderBy {
                field,
                direction,
                chain,
            } => planner.order(field, *direction, *chain),
            Modifier::Distinct => planner.distinct(DistinctClause::Rows),
            Modifier::DistinctBy(field) => planner.distinct(DistinctClause::On(field.clone())),
            Modifier::Window(w) => planner.window(*w),
        }
    }
    planner.finish()
}

fn write_from_where<W: SqlWrite + ?Sized>(w: &mut W, table: &str, expression: &Expression) {
    w.push(" FROM ");
    w.push(&quote_ident(table));
    if *expression != Expression::Constant(true) {
        w.push(" WHERE ");
        write_expression(w, expression);
    }
}

fn write_level<W: SqlWrite + ?Sized>(
    w: &mut W,
    table: &str,
    expression: &Expression,
    levels: &[SelectLevel],
) {
    let Some((level, inner)) = levels.split_last() else {
        return;
    };

    w.push("SELECT ");
    match &level.distinct {
        Some(DistinctClause::Rows) => w.push("DISTINCT "),
        Some(DistinctClause::On(field)) => {
            w.push("DISTINCT ON (");
            w.push(&quote_ident(field));
            w.push(") ");
        }
        None => {}
    }
    w.push("*");

    if inner.is_empty() {
        write_from_where(w, table, expression);
    } else {
        w.push(" FROM (");
        write_level(w, table, expression, inner);
        w.push(") AS q");
        w.push(&inner.len().to_string());
    }

    if !level.order.is_empty() {
        w.push(" ORDER BY ");
        for (i, (field, direction)) in level.order.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&quote_ident(field));
            w.push(" ");
            w.push(&direction.to_string());
        }
    }

    if let Some(window) = level.window {
        w.push(" LIMIT ");
        w.bind(Value::Integer(i64::try_from(window.take).unwrap_or(i64::MAX)));
        w.push(" OFFSET ");
        w.bind(Value::Integer(i64::try_from(window.skip).unwrap_or(i64::MAX)));
    }
}

/// Write `SELECT ... FROM table WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
///
/// Pipelines that reorder or de-duplicate after a window, or reorder after a
/// distinct-on, render as nested subqueries.
pub fn write_select<W: SqlWrite + ?Sized>(
    w: &mut W,
    table: &str,
    expression: &Expression,
    modifiers: &ModifierPipeline,
) {
    write_level(w, table, expression, &plan_levels(modifiers));
}

/// Write a row count of the query, optionally counting a key column
///
/// Distinct and windowed queries are counted through a subquery so the count
/// matches the rows the select would return.
pub fn write_count<W: SqlWrite + ?Sized>(
    w: &mut W,
    table: &str,
    expression: &Expression,
    modifiers: &ModifierPipeline,
    projection: Option<&str>,
) {
    let target = projection.map_or_else(|| "*".to_string(), quote_ident);
    w.push("SELECT COUNT(");
    w.push(&target);
    w.push(")");

    let levels = plan_levels(modifiers);
    let needs_subquery = levels.len() > 1
        || levels
            .first()
            .is_some_and(|level| level.distinct.is_some() || level.window.is_some());
    if needs_subquery {
        w.push(" FROM (");
        write_level(w, table, expression, &levels);
        w.push(") AS counted");
    } else {
        write_from_where(w, table, expression);
    }
}

#[cfg(feature = "database")]
mod postgres {
    use sqlx::{Postgres, QueryBuilder};

    use super::{write_count, write_select, SqlWrite};
    use crate::context::Entity;
    use crate::specification::{Query, Value};

    /// [`SqlWrite`] over a `sqlx::QueryBuilder<Postgres>` with typed binds
    pub struct PgQueryWriter {
        qb: QueryBuilder<'static, Postgres>,
    }

    impl PgQueryWriter {
        /// Empty writer
        pub fn new() -> Self {
            Self {
                qb: QueryBuilder::new(""),
            }
        }

        /// Take the underlying builder
        pub fn into_builder(self) -> QueryBuilder<'static, Postgres> {
            self.qb
        }
    }

    impl Default for PgQueryWriter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SqlWrite for PgQueryWriter {
        fn push(&mut self, sql: &str) {
            self.qb.push(sql);
        }

        fn bind(&mut self, value: Value) {
            match value {
                Value::String(s) => {
                    self.qb.push_bind(s);
                }
                Value::Integer(n) => {
                    self.qb.push_bind(n);
                }
                Value::Float(n) => {
                    self.qb.push_bind(n);
                }
                Value::Boolean(b) => {
                    self.qb.push_bind(b);
                }
                Value::Timestamp(t) => {
                    self.qb.push_bind(t);
                }
                Value::Uuid(u) => {
                    self.qb.push_bind(u);
                }
                Value::List(items) => {
                    // conditions expand lists; anything left is bound as text[]
                    let texts: Vec<String> = items.iter().map(ToString::to_string).collect();
                    self.qb.push_bind(texts);
                }
                Value::Null => {
                    self.qb.push_bind(Option::<String>::None);
                }
            }
        }
    }

    impl<T: Entity> Query<T> {
        /// Build a `sqlx` select for this query
        pub fn to_query_builder(&self, table: &str) -> QueryBuilder<'static, Postgres> {
            let mut writer = PgQueryWriter::new();
            write_select(&mut writer, table, self.predicate().expression(), self.modifiers());
            writer.into_builder()
        }

        /// Build a `sqlx` count for this query
        pub fn to_count_builder(
            &self,
            table: &str,
            projection: Option<&str>,
        ) -> QueryBuilder<'static, Postgres> {
            let mut writer = PgQueryWriter::new();
            write_count(
                &mut writer,
                table,
                self.predicate().expression(),
                self.modifiers(),
                projection,
            );
            writer.into_builder()
        }
    }
}

#[cfg(feature = "database")]
pub use postgres::PgQueryWriter;
