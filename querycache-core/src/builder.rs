//! Builder surface shared by every query object.
//!
//! Implementors provide two hooks, [`QueryBuilder::mutate`] for calls that
//! change the definition and [`QueryBuilder::inspect`] for calls that only
//! read it. Every builder method is expressed through them, so a wrapper can
//! route each call by method name without reimplementing the surface.

use crate::definition::{Boolean, Direction, EagerLoad, Operator, Order, Predicate, QueryDefinition};
use crate::directive::CacheDirective;
use crate::value::Value;
use std::collections::BTreeMap;

/// Chainable builder methods and non-executing derived values.
pub trait QueryBuilder: Sized {
    /// Apply a builder-mutating call and hand the receiver back for chaining.
    fn mutate<F>(self, method: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut QueryDefinition);

    /// Read from the definition without executing anything.
    fn inspect<R, F>(&self, method: &'static str, read: F) -> R
    where
        F: FnOnce(&QueryDefinition) -> R;

    // === Predicates ===

    fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    fn where_op(self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        let predicate = Predicate::Compare {
            column: column.into(),
            operator,
            value: value.into(),
            boolean: Boolean::And,
        };
        self.mutate("where", move |q| q.wheres.push(predicate))
    }

    fn or_where(self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        let predicate = Predicate::Compare {
            column: column.into(),
            operator,
            value: value.into(),
            boolean: Boolean::Or,
        };
        self.mutate("or_where", move |q| q.wheres.push(predicate))
    }

    fn where_in<V: Into<Value>>(self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let predicate = Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
            boolean: Boolean::And,
        };
        self.mutate("where_in", move |q| q.wheres.push(predicate))
    }

    fn where_not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let predicate = Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
            boolean: Boolean::And,
        };
        self.mutate("where_not_in", move |q| q.wheres.push(predicate))
    }

    fn where_null(self, column: impl Into<String>) -> Self {
        let predicate = Predicate::Null {
            column: column.into(),
            negated: false,
            boolean: Boolean::And,
        };
        self.mutate("where_null", move |q| q.wheres.push(predicate))
    }

    fn where_not_null(self, column: impl Into<String>) -> Self {
        let predicate = Predicate::Null {
            column: column.into(),
            negated: true,
            boolean: Boolean::And,
        };
        self.mutate("where_not_null", move |q| q.wheres.push(predicate))
    }

    /// Constrain the primary key (`id`).
    fn where_key(self, key: impl Into<Value>) -> Self {
        let predicate = Predicate::Compare {
            column: "id".to_string(),
            operator: Operator::Eq,
            value: key.into(),
            boolean: Boolean::And,
        };
        self.mutate("where_key", move |q| q.wheres.push(predicate))
    }

    fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        let predicate = Predicate::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::And,
        };
        self.mutate("where_raw", move |q| q.wheres.push(predicate))
    }

    /// Append an arbitrary predicate node, e.g. a parenthesized group.
    fn where_predicate(self, predicate: Predicate) -> Self {
        self.mutate("where_predicate", move |q| q.wheres.push(predicate))
    }

    // === Projection ===

    fn select<C: Into<String>>(self, columns: impl IntoIterator<Item = C>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.mutate("select", move |q| q.columns = Some(columns))
    }

    fn add_select(self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.mutate("add_select", move |q| {
            q.columns.get_or_insert_with(Vec::new).push(column)
        })
    }

    // === Ordering & limits ===

    fn order_by(self, column: impl Into<String>, direction: Direction) -> Self {
        let order = Order {
            column: column.into(),
            direction,
        };
        self.mutate("order_by", move |q| q.orders.push(order))
    }

    fn latest(self, column: impl Into<String>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    fn limit(self, limit: u64) -> Self {
        self.mutate("limit", move |q| q.limit = Some(limit))
    }

    fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    fn offset(self, offset: u64) -> Self {
        self.mutate("offset", move |q| q.offset = Some(offset))
    }

    fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// Set limit and offset for a one-based page.
    fn for_page(self, page: u64, per_page: u64) -> Self {
        self.mutate("for_page", move |q| {
            q.offset = Some(page.max(1).saturating_sub(1).saturating_mul(per_page));
            q.limit = Some(per_page);
        })
    }

    // === Eager loads ===

    /// Register a (possibly dotted) relation for eager loading.
    fn with(self, path: &str) -> Self {
        self.mutate("with", move |q| {
            q.eager_load_entry(path);
        })
    }

    /// Register a relation whose sub-query is shaped by `constrain`.
    ///
    /// The closure runs immediately; its result (predicates, projection,
    /// nested loads and an optional cache directive) is stored in the
    /// eager-load graph as data.
    fn with_constraint<F, R>(self, path: &str, constrain: F) -> Self
    where
        F: FnOnce(RelationQuery) -> R,
        R: Into<EagerLoad>,
    {
        self.mutate("with", move |q| {
            let node = q.eager_load_entry(path);
            let relation = RelationQuery::new(node.constraint.clone());
            *node = constrain(relation).into();
        })
    }

    // === Derived values ===

    fn to_sql(&self) -> String {
        self.inspect("to_sql", QueryDefinition::to_sql)
    }

    fn bindings(&self) -> Vec<Value> {
        self.inspect("bindings", QueryDefinition::bindings)
    }

    fn eager_loads(&self) -> BTreeMap<String, EagerLoad> {
        self.inspect("eager_loads", |q| q.eager_loads.clone())
    }

    fn definition(&self) -> QueryDefinition {
        self.inspect("definition", |q| q.clone())
    }
}

// ============================================================================
// RELATION SUB-QUERIES
// ============================================================================

/// The sub-query handed to an eager-load constraint closure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationQuery {
    constraint: QueryDefinition,
}

impl RelationQuery {
    pub fn new(constraint: QueryDefinition) -> Self {
        Self { constraint }
    }

    /// Cache this relation's sub-query with default settings.
    pub fn cache(self) -> CachedRelation {
        self.cache_with(CacheDirective::new())
    }

    /// Cache this relation's sub-query with an explicit directive.
    pub fn cache_with(self, directive: CacheDirective) -> CachedRelation {
        CachedRelation {
            constraint: self.constraint,
            directive,
        }
    }
}

impl QueryBuilder for RelationQuery {
    fn mutate<F>(mut self, _method: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut QueryDefinition),
    {
        apply(&mut self.constraint);
        self
    }

    fn inspect<R, F>(&self, _method: &'static str, read: F) -> R
    where
        F: FnOnce(&QueryDefinition) -> R,
    {
        read(&self.constraint)
    }
}

impl From<RelationQuery> for EagerLoad {
    fn from(relation: RelationQuery) -> Self {
        EagerLoad {
            constraint: relation.constraint,
            directive: None,
        }
    }
}

/// A relation sub-query that carries its own cache directive.
///
/// There is no way to cache it a second time: the type has no `cache` method.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRelation {
    constraint: QueryDefinition,
    directive: CacheDirective,
}

impl CachedRelation {
    pub fn directive(&self) -> &CacheDirective {
        &self.directive
    }
}

impl QueryBuilder for CachedRelation {
    fn mutate<F>(mut self, _method: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut QueryDefinition),
    {
        apply(&mut self.constraint);
        self
    }

    fn inspect<R, F>(&self, _method: &'static str, read: F) -> R
    where
        F: FnOnce(&QueryDefinition) -> R,
    {
        read(&self.constraint)
    }
}

impl From<CachedRelation> for EagerLoad {
    fn from(relation: CachedRelation) -> Self {
        EagerLoad {
            constraint: relation.constraint,
            directive: Some(relation.directive),
        }
    }
}
