//! A cache store that records every call made to it.

use querycache_core::{QueryCacheResult, StoreError, Ttl};
use querycache_storage::{CacheStore, LockOwner, LockProvider, MemoryStore};
use std::sync::Mutex;
use std::time::Duration;

/// One call observed by a [`SpyStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Has(String),
    Get(String),
    Put { key: String, ttl: Ttl },
    Forget(String),
    /// One acquisition attempt.
    Acquire { key: String, hold: Duration },
    Release(String),
}

impl StoreCall {
    pub fn key(&self) -> &str {
        match self {
            StoreCall::Has(key)
            | StoreCall::Get(key)
            | StoreCall::Forget(key)
            | StoreCall::Release(key) => key,
            StoreCall::Put { key, .. } | StoreCall::Acquire { key, .. } => key,
        }
    }

    pub fn is_lock_call(&self) -> bool {
        matches!(self, StoreCall::Acquire { .. } | StoreCall::Release(_))
    }
}

/// Wraps a [`MemoryStore`] and records the calls the decorator makes.
#[derive(Debug)]
pub struct SpyStore {
    inner: MemoryStore,
    lockable: bool,
    calls: Mutex<Vec<StoreCall>>,
}

impl SpyStore {
    /// A spy that supports atomic locks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: MemoryStore::new(name),
            lockable: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A spy without atomic-lock support.
    pub fn without_locks(name: impl Into<String>) -> Self {
        Self {
            lockable: false,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Every `put` call, in order.
    pub fn puts(&self) -> Vec<(String, Ttl)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Put { key, ttl } => Some((key, ttl)),
                _ => None,
            })
            .collect()
    }

    /// Write bytes without recording the call, as another writer would.
    pub fn put_raw(&self, key: &str, value: &[u8]) {
        self.inner
            .put(key, value.to_vec(), &Ttl::seconds(3600))
            .unwrap();
    }

    /// Read bytes without recording the call.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).unwrap()
    }

    /// The underlying store, for inspection.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn locks(&self) -> QueryCacheResult<&dyn LockProvider> {
        self.inner.lock_provider().ok_or_else(|| {
            StoreError::Backend {
                store: self.inner.name().to_string(),
                reason: "inner store has no lock support".to_string(),
            }
            .into()
        })
    }
}

impl CacheStore for SpyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn has(&self, key: &str) -> QueryCacheResult<bool> {
        self.record(StoreCall::Has(key.to_string()));
        self.inner.has(key)
    }

    fn get(&self, key: &str) -> QueryCacheResult<Option<Vec<u8>>> {
        self.record(StoreCall::Get(key.to_string()));
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: &Ttl) -> QueryCacheResult<()> {
        self.record(StoreCall::Put {
            key: key.to_string(),
            ttl: ttl.clone(),
        });
        self.inner.put(key, value, ttl)
    }

    fn forget(&self, key: &str) -> QueryCacheResult<bool> {
        self.record(StoreCall::Forget(key.to_string()));
        self.inner.forget(key)
    }

    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        if self.lockable {
            Some(self as &dyn LockProvider)
        } else {
            None
        }
    }
}

impl LockProvider for SpyStore {
    fn try_acquire(&self, key: &str, owner: &LockOwner, hold: Duration) -> QueryCacheResult<bool> {
        self.record(StoreCall::Acquire {
            key: key.to_string(),
            hold,
        });
        self.locks()?.try_acquire(key, owner, hold)
    }

    fn release(&self, key: &str, owner: &LockOwner) -> QueryCacheResult<bool> {
        self.record(StoreCall::Release(key.to_string()));
        self.locks()?.release(key, owner)
    }

    fn wait_for_release(&self, key: &str, timeout: Duration) {
        if let Ok(locks) = self.locks() {
            locks.wait_for_release(key, timeout);
        }
    }
}
