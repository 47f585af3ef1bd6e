//! The decorated query.
//!
//! [`CachedQuery`] holds one [`Query`] and the directive fixed when it was
//! wrapped. It offers the same surface as the query it wraps. Every call is
//! classified by name: builder calls are applied to the inner query and the
//! decorator is handed back, terminal calls go through the cached-execution
//! protocol, and re-attaching a cache is rejected.
//!
//! Terminal calls consume the decorator, so one wrap serves exactly one
//! terminal call.

use crate::classifier::{classify, CallKind};
use crate::connection::Connection;
use crate::protocol;
use crate::query::{Cacheable, Query, Terminal};
use querycache_core::{
    fingerprint, CacheDirective, CacheSettings, Fingerprint, ProxyError, QueryBuilder,
    QueryCacheResult, QueryDefinition, QueryResult, Retrieval, Value,
};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct CachedQuery {
    query: Query,
    directive: CacheDirective,
}

impl CachedQuery {
    pub(crate) fn new(query: Query, directive: CacheDirective) -> Self {
        Self { query, directive }
    }

    pub fn directive(&self) -> &CacheDirective {
        &self.directive
    }

    pub fn connection(&self) -> &Arc<Connection> {
        route_as("connection", CallKind::PassThroughProperty);
        self.query.connection()
    }

    pub fn from(&self) -> &str {
        route_as("from", CallKind::PassThroughProperty);
        self.query.from()
    }

    pub fn set_from(mut self, table: impl Into<String>) -> Self {
        route_as("set_from", CallKind::PassThroughProperty);
        self.query = self.query.set_from(table);
        self
    }

    /// Replace the wrapped query's bound values in placeholder order.
    pub fn set_bindings(mut self, values: Vec<Value>) -> QueryCacheResult<Self> {
        route_as("set_bindings", CallKind::PassThroughProperty);
        self.query = self.query.set_bindings(values)?;
        Ok(self)
    }

    /// The key a terminal call with `retrieval` would be cached under.
    pub fn fingerprint_for(&self, retrieval: &Retrieval) -> QueryCacheResult<Fingerprint> {
        let connection = self.query.connection();
        let retrieval = retrieval.clone().resolve(connection.pagination());
        Ok(fingerprint(
            self.query.definition_ref(),
            &self.directive,
            &retrieval,
            connection.pagination(),
            &connection.settings().namespace,
        )?)
    }

    /// Forward a call the decorator has no explicit method for.
    ///
    /// The call sees the wrapped query read-only and its result is returned
    /// unchanged. Names that classify as terminal or as a cache attachment
    /// are refused, since forwarding them would bypass the cache.
    pub fn forward<R>(&self, method: &str, call: impl FnOnce(&Query) -> R) -> QueryCacheResult<R> {
        match route(method) {
            CallKind::PassThroughProperty | CallKind::BuilderMutator => Ok(call(&self.query)),
            kind => Err(ProxyError::UnroutableCall {
                method: method.to_string(),
                kind: kind.to_string(),
            }
            .into()),
        }
    }
}

/// Classify and trace one routed call.
fn route(method: &str) -> CallKind {
    let kind = classify(method);
    trace!(method, kind = %kind, "Routing call");
    kind
}

/// Route a call that arrived through a typed entry point of kind `expected`.
///
/// The decision table must agree with the entry point.
fn route_as(method: &str, expected: CallKind) {
    let kind = route(method);
    debug_assert_eq!(kind, expected, "decision table misroutes {}", method);
}

impl QueryBuilder for CachedQuery {
    fn mutate<F>(mut self, method: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut QueryDefinition),
    {
        route_as(method, CallKind::BuilderMutator);
        self.query = self.query.mutate(method, apply);
        self
    }

    fn inspect<R, F>(&self, method: &'static str, read: F) -> R
    where
        F: FnOnce(&QueryDefinition) -> R,
    {
        route_as(method, CallKind::BuilderMutator);
        self.query.inspect(method, read)
    }
}

impl Terminal for CachedQuery {
    fn settings(&self) -> &CacheSettings {
        self.query.connection().settings()
    }

    fn run(self, retrieval: Retrieval) -> QueryCacheResult<QueryResult> {
        route_as(retrieval.method(), CallKind::Terminal);
        protocol::execute(&self.query, &self.directive, retrieval)
    }
}

impl Cacheable for CachedQuery {
    fn cache_with(self, _directive: CacheDirective) -> QueryCacheResult<CachedQuery> {
        route_as("cache", CallKind::ReAttachRejected);
        Err(ProxyError::AlreadyWrapped.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{QueryExecutor, RelationLoader};
    use querycache_core::{QueryCacheError, Record};
    use querycache_storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Executor returning one fixed record and counting executions.
    #[derive(Default)]
    struct StubExecutor {
        executions: AtomicUsize,
    }

    impl QueryExecutor for StubExecutor {
        fn execute(
            &self,
            _query: &QueryDefinition,
            retrieval: &Retrieval,
            _relations: &dyn RelationLoader,
        ) -> QueryCacheResult<QueryResult> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let record = Record::new().with("id", 1);
            Ok(match retrieval {
                Retrieval::First { .. } => QueryResult::Record(Some(record)),
                _ => QueryResult::Rows(vec![record]),
            })
        }
    }

    fn connection(executor: Arc<StubExecutor>) -> Arc<Connection> {
        Arc::new(Connection::new(executor, Arc::new(MemoryStore::new("memory"))))
    }

    #[test]
    fn test_cache_twice_is_rejected() {
        let executor = Arc::new(StubExecutor::default());
        let result = connection(executor.clone())
            .table("users")
            .cache()
            .and_then(|cached| cached.cache());
        assert_eq!(
            result.unwrap_err(),
            QueryCacheError::Proxy(ProxyError::AlreadyWrapped)
        );
        assert_eq!(executor.executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let executor = Arc::new(StubExecutor::default());
        let connection = connection(executor.clone());

        let first = connection.table("users").cache().unwrap().where_eq("id", 1).first().unwrap();
        let second = connection.table("users").cache().unwrap().where_eq("id", 1).first().unwrap();

        assert_eq!(first, second);
        assert_eq!(executor.executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inspection_does_not_execute() {
        let executor = Arc::new(StubExecutor::default());
        let cached = connection(executor.clone())
            .table("users")
            .cache()
            .unwrap()
            .where_eq("id", 1);

        assert_eq!(cached.to_sql(), "select * from \"users\" where \"id\" = ?");
        assert_eq!(cached.from(), "users");
        assert_eq!(executor.executions.load(Ordering::SeqCst), 0);
        assert!(cached.connection().store().get("anything").unwrap().is_none());
    }

    #[test]
    fn test_forward_refuses_terminals() {
        let executor = Arc::new(StubExecutor::default());
        let cached = connection(executor).table("users").cache().unwrap();

        assert_eq!(cached.forward("grammar", |q| q.from().len()).unwrap(), 5);
        assert!(matches!(
            cached.forward("first", |_| ()),
            Err(QueryCacheError::Proxy(ProxyError::UnroutableCall { .. }))
        ));
        assert!(matches!(
            cached.forward("cache", |_| ()),
            Err(QueryCacheError::Proxy(ProxyError::UnroutableCall { .. }))
        ));
    }

    #[test]
    fn test_pass_through_bindings_set_and_read_back() {
        let executor = Arc::new(StubExecutor::default());
        let connection = connection(executor.clone());
        let cached = connection
            .table("users")
            .cache()
            .unwrap()
            .where_eq("id", 1)
            .where_in("age", [30, 40]);
        let before = cached.fingerprint_for(&Retrieval::get()).unwrap();

        let rebound = cached
            .set_bindings(vec![Value::Int(2), Value::Int(50), Value::Int(60)])
            .unwrap();
        assert_eq!(
            rebound.bindings(),
            vec![Value::Int(2), Value::Int(50), Value::Int(60)]
        );
        assert_eq!(
            rebound.to_sql(),
            "select * from \"users\" where \"id\" = ? and \"age\" in (?, ?)"
        );
        assert_ne!(rebound.fingerprint_for(&Retrieval::get()).unwrap(), before);

        let mismatched = rebound.set_bindings(vec![Value::Int(1)]);
        assert!(matches!(
            mismatched,
            Err(QueryCacheError::Proxy(ProxyError::InvalidArgument { .. }))
        ));
        assert_eq!(executor.executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_every_entry_point_agrees_with_decision_table() {
        use querycache_core::Direction;

        let executor = Arc::new(StubExecutor::default());
        let connection = connection(executor.clone());
        let cached = || connection.table("users").cache().unwrap();

        let built = cached()
            .where_eq("id", 1)
            .where_in("id", [1, 2])
            .where_null("deleted_at")
            .select(["id"])
            .add_select("name")
            .order_by("id", Direction::Asc)
            .latest("created_at")
            .take(5)
            .skip(1)
            .for_page(1, 5)
            .with("posts")
            .set_from("people");
        let _ = (built.to_sql(), built.bindings(), built.eager_loads(), built.definition());
        let _ = (built.from().to_string(), built.connection().name().to_string());

        // Shapes the stub cannot produce still route as terminals first.
        let _ = cached().first();
        let _ = cached().get();
        let _ = cached().paginate();
        let _ = cached().count();
        let _ = cached().exists();
        let _ = cached().sum("age");
        let _ = cached().max("age");
        let _ = cached().min("age");
        let _ = cached().increment("age", 1);
        let _ = cached().decrement("age", 1);
        let _ = cached().update([("age", 1)]);
        assert!(cached().cache().is_err());
        assert_eq!(executor.executions.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_fingerprint_for_matches_stored_key() {
        let executor = Arc::new(StubExecutor::default());
        let connection = connection(executor);
        let cached = connection.table("users").cache().unwrap().where_eq("id", 1);

        let key = cached.fingerprint_for(&Retrieval::first()).unwrap();
        cached.first().unwrap();
        assert!(connection.store().has(key.as_str()).unwrap());
    }
}
