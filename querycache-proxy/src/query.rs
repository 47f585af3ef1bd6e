//! The underlying (uncached) query object and the terminal-call surface.

use crate::connection::Connection;
use crate::decorator::CachedQuery;
use crate::propagate::EagerLoadPropagator;
use querycache_core::{
    Aggregate, CacheDirective, CacheSettings, Page, ProxyError, QueryBuilder, QueryCacheResult,
    QueryDefinition, QueryResult, Record, ResultShape, Retrieval, Value, Write,
};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// QUERY
// ============================================================================

/// A query builder bound to a connection.
#[derive(Debug, Clone)]
pub struct Query {
    connection: Arc<Connection>,
    definition: QueryDefinition,
}

impl Query {
    pub fn new(connection: Arc<Connection>, table: impl Into<String>) -> Self {
        Self::from_definition(connection, QueryDefinition::new(table))
    }

    pub fn from_definition(connection: Arc<Connection>, definition: QueryDefinition) -> Self {
        Self {
            connection,
            definition,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The table this query selects from.
    pub fn from(&self) -> &str {
        &self.definition.table
    }

    pub fn set_from(mut self, table: impl Into<String>) -> Self {
        self.definition.table = table.into();
        self
    }

    /// Replace the bound values in placeholder order, keeping the compiled SQL.
    pub fn set_bindings(mut self, values: Vec<Value>) -> QueryCacheResult<Self> {
        self.definition.set_bindings(values)?;
        Ok(self)
    }

    pub(crate) fn definition_ref(&self) -> &QueryDefinition {
        &self.definition
    }
}

impl QueryBuilder for Query {
    fn mutate<F>(mut self, _method: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut QueryDefinition),
    {
        apply(&mut self.definition);
        self
    }

    fn inspect<R, F>(&self, _method: &'static str, read: F) -> R
    where
        F: FnOnce(&QueryDefinition) -> R,
    {
        read(&self.definition)
    }
}

impl Terminal for Query {
    fn settings(&self) -> &CacheSettings {
        self.connection.settings()
    }

    fn run(self, retrieval: Retrieval) -> QueryCacheResult<QueryResult> {
        let connection = self.connection;
        let retrieval = retrieval.resolve(connection.pagination());
        let loader = EagerLoadPropagator::new(&connection);
        connection
            .executor()
            .execute(&self.definition, &retrieval, &loader)
    }
}

impl Cacheable for Query {
    fn cache_with(self, directive: CacheDirective) -> QueryCacheResult<CachedQuery> {
        Ok(CachedQuery::new(self, directive))
    }
}

// ============================================================================
// CACHE ATTACHMENT
// ============================================================================

/// The cache-attachment call.
pub trait Cacheable: Sized {
    /// Wrap this query in a cache decorator with the given directive.
    fn cache_with(self, directive: CacheDirective) -> QueryCacheResult<CachedQuery>;

    /// Wrap with the default TTL, a derived key and no lock.
    fn cache(self) -> QueryCacheResult<CachedQuery> {
        self.cache_with(CacheDirective::new())
    }
}

// ============================================================================
// TERMINAL CALLS
// ============================================================================

/// Calls that execute the query.
///
/// Implementors provide [`Terminal::run`]; every other method builds a
/// [`Retrieval`] and unwraps the result shape it promises.
pub trait Terminal: Sized {
    fn settings(&self) -> &CacheSettings;

    /// Execute a retrieval and return the raw result.
    fn run(self, retrieval: Retrieval) -> QueryCacheResult<QueryResult>;

    fn first(self) -> QueryCacheResult<Option<Record>> {
        self.first_columns(None)
    }

    fn first_columns(self, columns: Option<Vec<String>>) -> QueryCacheResult<Option<Record>> {
        match self.run(Retrieval::First { columns })? {
            QueryResult::Record(record) => Ok(record),
            other => Err(unexpected("first", ResultShape::Record, &other)),
        }
    }

    /// Retrieve the record with the given primary key.
    fn find(self, key: impl Into<Value>) -> QueryCacheResult<Option<Record>>
    where
        Self: QueryBuilder,
    {
        self.where_key(key).first()
    }

    fn get(self) -> QueryCacheResult<Vec<Record>> {
        self.get_columns(None)
    }

    fn get_columns(self, columns: Option<Vec<String>>) -> QueryCacheResult<Vec<Record>> {
        match self.run(Retrieval::Get { columns })? {
            QueryResult::Rows(rows) => Ok(rows),
            other => Err(unexpected("get", ResultShape::Rows, &other)),
        }
    }

    /// Paginate with the default page size, taking the page from the
    /// pagination context.
    fn paginate(self) -> QueryCacheResult<Page> {
        let per_page = self.settings().default_per_page;
        self.paginate_with(per_page, None, None)
    }

    fn paginate_with(
        self,
        per_page: u64,
        page: Option<u64>,
        columns: Option<Vec<String>>,
    ) -> QueryCacheResult<Page> {
        let page_name = self.settings().page_name.clone();
        let retrieval = Retrieval::Paginate {
            per_page,
            page,
            columns,
            page_name,
        };
        match self.run(retrieval)? {
            QueryResult::Page(page) => Ok(page),
            other => Err(unexpected("paginate", ResultShape::Page, &other)),
        }
    }

    fn count(self) -> QueryCacheResult<u64> {
        match aggregate(self, Aggregate::Count, None)? {
            Value::Int(n) => Ok(n.max(0) as u64),
            other => Err(unexpected_value("count", "int", &other)),
        }
    }

    fn exists(self) -> QueryCacheResult<bool> {
        match aggregate(self, Aggregate::Exists, None)? {
            Value::Bool(b) => Ok(b),
            other => Err(unexpected_value("exists", "bool", &other)),
        }
    }

    fn sum(self, column: impl Into<String>) -> QueryCacheResult<Value> {
        aggregate(self, Aggregate::Sum, Some(column.into()))
    }

    fn max(self, column: impl Into<String>) -> QueryCacheResult<Value> {
        aggregate(self, Aggregate::Max, Some(column.into()))
    }

    fn min(self, column: impl Into<String>) -> QueryCacheResult<Value> {
        aggregate(self, Aggregate::Min, Some(column.into()))
    }

    fn increment(self, column: impl Into<String>, amount: i64) -> QueryCacheResult<u64> {
        write(
            self,
            Write::Increment {
                column: column.into(),
                amount,
            },
        )
    }

    fn decrement(self, column: impl Into<String>, amount: i64) -> QueryCacheResult<u64> {
        let amount = amount.checked_neg().ok_or_else(|| ProxyError::InvalidArgument {
            method: "decrement".to_string(),
            reason: format!("amount {} cannot be negated", amount),
        })?;
        write(
            self,
            Write::Increment {
                column: column.into(),
                amount,
            },
        )
    }

    fn update<K, V>(self, values: impl IntoIterator<Item = (K, V)>) -> QueryCacheResult<u64>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let values: BTreeMap<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        write(self, Write::Update { values })
    }
}

fn aggregate<T: Terminal>(
    query: T,
    function: Aggregate,
    column: Option<String>,
) -> QueryCacheResult<Value> {
    let retrieval = Retrieval::Aggregate { function, column };
    let method = retrieval.method();
    match query.run(retrieval)? {
        QueryResult::Scalar(value) => Ok(value),
        other => Err(unexpected(method, ResultShape::Scalar, &other)),
    }
}

fn write<T: Terminal>(query: T, write: Write) -> QueryCacheResult<u64> {
    let retrieval = Retrieval::Write(write);
    let method = retrieval.method();
    match query.run(retrieval)? {
        QueryResult::Affected(n) => Ok(n),
        other => Err(unexpected(method, ResultShape::Affected, &other)),
    }
}

fn unexpected(method: &str, expected: ResultShape, found: &QueryResult) -> querycache_core::QueryCacheError {
    ProxyError::UnexpectedResult {
        method: method.to_string(),
        expected: expected.to_string(),
        found: found.shape().to_string(),
    }
    .into()
}

fn unexpected_value(method: &str, expected: &str, found: &Value) -> querycache_core::QueryCacheError {
    ProxyError::UnexpectedResult {
        method: method.to_string(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
    .into()
}
