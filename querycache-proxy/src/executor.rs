//! Collaborator traits for the underlying query executor.

use querycache_core::{CacheDirective, QueryCacheResult, QueryDefinition, QueryResult, Record, Retrieval};

/// Runs query definitions against a data source.
///
/// Implementations resolve eager loads by handing each relation sub-query to
/// the supplied [`RelationLoader`] instead of running it themselves, so the
/// caller decides whether a relation is served from cache.
pub trait QueryExecutor: Send + Sync {
    /// Execute `query` for the given (already resolved) retrieval.
    fn execute(
        &self,
        query: &QueryDefinition,
        retrieval: &Retrieval,
        relations: &dyn RelationLoader,
    ) -> QueryCacheResult<QueryResult>;
}

/// One relation sub-query issued while resolving eager loads.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationFetch {
    /// Relation name, relative to the query that registered it.
    pub path: String,
    /// The relation constraint merged with the parent-key constraint.
    pub query: QueryDefinition,
    /// Set when the caller wrapped the relation sub-query in its own cache call.
    pub directive: Option<CacheDirective>,
}

/// Loads the related records for one eager-loaded relation.
pub trait RelationLoader {
    fn load(&self, fetch: RelationFetch) -> QueryCacheResult<Vec<Record>>;
}
