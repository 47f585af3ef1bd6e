//! Connection: the executor, cache store and pagination context a query runs against.

use crate::executor::QueryExecutor;
use crate::query::Query;
use querycache_core::{
    CacheSettings, Fingerprint, NoPagination, PaginationContext, QueryCacheResult,
};
use querycache_storage::CacheStore;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Everything a query needs beyond its own definition.
///
/// A connection is immutable once shared. Binding a different pagination
/// context (e.g. per request) produces a new connection over the same
/// executor and store.
#[derive(Clone)]
pub struct Connection {
    name: String,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<dyn CacheStore>,
    pagination: Arc<dyn PaginationContext>,
    settings: CacheSettings,
}

impl Connection {
    pub fn new(executor: Arc<dyn QueryExecutor>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            name: "default".to_string(),
            executor,
            store,
            pagination: Arc::new(NoPagination),
            settings: CacheSettings::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the cache settings, rejecting invalid ones.
    pub fn with_settings(mut self, settings: CacheSettings) -> QueryCacheResult<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Bind a pagination context, keeping executor, store and settings.
    pub fn with_pagination(&self, pagination: Arc<dyn PaginationContext>) -> Arc<Connection> {
        Arc::new(Self {
            pagination,
            ..self.clone()
        })
    }

    /// Start a query on `table`.
    pub fn table(self: &Arc<Self>, table: impl Into<String>) -> Query {
        Query::new(Arc::clone(self), table)
    }

    /// Remove the entry cached under a pinned key.
    pub fn forget_cached(&self, key: &str) -> QueryCacheResult<bool> {
        let fingerprint = Fingerprint::pinned(&self.settings.namespace, key);
        let removed = self.store.forget(fingerprint.as_str())?;
        debug!(key = %fingerprint, store = self.store.name(), removed, "Forgot cached entry");
        Ok(removed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn pagination(&self) -> &dyn PaginationContext {
        self.pagination.as_ref()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
