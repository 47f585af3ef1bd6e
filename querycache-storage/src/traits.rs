//! Cache store traits.
//!
//! A [`CacheStore`] is a byte-oriented key/value store with per-entry TTLs.
//! Stores that can coordinate concurrent writers also expose a
//! [`LockProvider`] for named atomic locks.

use crate::lock::{LockOwner, PendingLock};
use querycache_core::{QueryCacheResult, Ttl};
use std::time::Duration;

/// Cache store trait for pluggable cache implementations.
///
/// Implementations must be thread-safe. Values are opaque bytes; the decorator
/// owns their encoding.
pub trait CacheStore: Send + Sync {
    /// The configured name of this store, used in error messages.
    fn name(&self) -> &str;

    /// Check whether a live entry exists under `key`.
    fn has(&self, key: &str) -> QueryCacheResult<bool>;

    /// Read the entry under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> QueryCacheResult<Option<Vec<u8>>>;

    /// Write an entry. An already-expired TTL removes any existing entry.
    fn put(&self, key: &str, value: Vec<u8>, ttl: &Ttl) -> QueryCacheResult<()>;

    /// Remove the entry under `key`. Returns whether one was present.
    fn forget(&self, key: &str) -> QueryCacheResult<bool>;

    /// The atomic-lock capability of this store, if it has one.
    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        None
    }
}

/// Atomic named locks.
///
/// Locks expire on their own after the hold duration, so a crashed holder
/// cannot block other callers forever. A zero hold never expires; such a
/// lock is only freed by its owner.
pub trait LockProvider: Send + Sync {
    /// Try once to acquire `key` for `owner`. Returns whether it was acquired.
    fn try_acquire(&self, key: &str, owner: &LockOwner, hold: Duration) -> QueryCacheResult<bool>;

    /// Release `key` if `owner` holds it. Returns whether it was held.
    fn release(&self, key: &str, owner: &LockOwner) -> QueryCacheResult<bool>;

    /// Park the caller until `key` may have become free, for at most `timeout`.
    ///
    /// Spurious wakeups are fine; [`PendingLock::block`] retries. The default
    /// polls.
    fn wait_for_release(&self, _key: &str, timeout: Duration) {
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
    }
}

impl dyn LockProvider + '_ {
    /// Prepare a lock on `key` that expires `hold` after acquisition, or
    /// never when `hold` is zero.
    pub fn lock(&self, key: &str, hold: Duration) -> PendingLock<'_> {
        PendingLock::new(self, key, hold)
    }
}
