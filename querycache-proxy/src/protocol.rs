//! Cached-execution protocol.
//!
//! ```text
//! Start → KeyComputed → (LockAcquired?) → Lookup → {HitReturn | MissExecute → Stored} → End
//! ```
//!
//! When the directive sets `wait`, the whole lookup/execute/store sequence
//! runs under a lock named after the fingerprint. The lock guard is dropped on
//! every exit path, including executor errors.

use crate::propagate::EagerLoadPropagator;
use crate::query::Query;
use querycache_core::{
    fingerprint, CacheDirective, CachedEnvelope, Fingerprint, ProxyError, QueryCacheResult,
    QueryResult, ResultShape, Retrieval,
};
use querycache_storage::CacheStore;
use tracing::{debug, warn};

/// Run one terminal call through the cache.
pub(crate) fn execute(
    query: &Query,
    directive: &CacheDirective,
    retrieval: Retrieval,
) -> QueryCacheResult<QueryResult> {
    let connection = query.connection();
    let settings = connection.settings();
    let store = connection.store();

    // Resolve the page once so the key and the executor agree on it.
    let retrieval = retrieval.resolve(connection.pagination());
    let key = fingerprint(
        query.definition_ref(),
        directive,
        &retrieval,
        connection.pagination(),
        &settings.namespace,
    )?;

    let _lock = match directive.wait() {
        Some(wait) => {
            let provider = store.lock_provider().ok_or_else(|| ProxyError::StoreNotLockable {
                store: store.name().to_string(),
            })?;
            Some(provider.lock(key.as_str(), wait).block(wait)?)
        }
        None => None,
    };

    if let Some(result) = lookup(store, &key, retrieval.result_shape())? {
        return Ok(result);
    }

    let wrapped = EagerLoadPropagator::cached_paths(query.definition_ref());
    if !wrapped.is_empty() {
        debug!(key = %key, relations = ?wrapped, "Propagating cache to eager loads");
    }
    let loader = EagerLoadPropagator::new(connection);
    let result = connection
        .executor()
        .execute(query.definition_ref(), &retrieval, &loader)?;

    let ttl = directive.resolved_ttl(settings.default_ttl);
    let bytes = CachedEnvelope::encode(&result).to_bytes()?;
    store.put(key.as_str(), bytes, &ttl)?;
    debug!(key = %key, store = store.name(), method = retrieval.method(), ttl = ?ttl, "Cache stored");

    Ok(result)
}

/// Look the fingerprint up, decoding a hit into the expected result shape.
///
/// A value that is not a valid envelope for this shape counts as a miss and
/// gets overwritten by the caller.
fn lookup(
    store: &dyn CacheStore,
    key: &Fingerprint,
    expected: ResultShape,
) -> QueryCacheResult<Option<QueryResult>> {
    if !store.has(key.as_str())? {
        debug!(key = %key, store = store.name(), "Cache miss");
        return Ok(None);
    }

    // The entry may expire between `has` and `get`.
    let Some(bytes) = store.get(key.as_str())? else {
        debug!(key = %key, store = store.name(), "Cache miss (expired)");
        return Ok(None);
    };

    match CachedEnvelope::from_bytes(&bytes).and_then(|envelope| envelope.decode(expected)) {
        Ok(result) => {
            debug!(key = %key, store = store.name(), "Cache hit");
            Ok(Some(result))
        }
        Err(e) => {
            warn!(key = %key, store = store.name(), error = %e, "Ignoring undecodable cached value");
            Ok(None)
        }
    }
}
