//! In-memory cache store.
//!
//! Entries expire lazily: an expired entry is invisible to reads and is
//! dropped the next time its key is touched. Locks live in a separate table
//! guarded by a mutex, with a condition variable to wake blocked callers.

use crate::lock::LockOwner;
use crate::traits::{CacheStore, LockProvider};
use chrono::{DateTime, Utc};
use querycache_core::{QueryCacheResult, Ttl};
use std::collections::HashMap;
use std::sync::{Condvar, LockResult, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Take the guard out of a lock result even if a holder panicked.
///
/// The guarded maps hold whole entries only, so a poisoned guard is still
/// consistent and the store keeps serving.
fn recover<G>(result: LockResult<G>, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(op, "Recovered poisoned store lock");
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    owner: LockOwner,
    expires_at: DateTime<Utc>,
}

/// When a lock taken at `now` for `hold` lapses. Zero means never.
fn lock_expiry(now: DateTime<Utc>, hold: Duration) -> DateTime<Utc> {
    if hold.is_zero() {
        return DateTime::<Utc>::MAX_UTC;
    }
    chrono::Duration::from_std(hold)
        .ok()
        .and_then(|hold| now.checked_add_signed(hold))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Lock table backing [`MemoryStore`]'s atomic locks.
#[derive(Debug, Default)]
struct LockTable {
    held: Mutex<HashMap<String, LockEntry>>,
    released: Condvar,
}

impl LockProvider for LockTable {
    fn try_acquire(&self, key: &str, owner: &LockOwner, hold: Duration) -> QueryCacheResult<bool> {
        let now = Utc::now();
        let mut held = recover(self.held.lock(), "try_acquire");

        if let Some(existing) = held.get(key) {
            if now < existing.expires_at {
                return Ok(false);
            }
            debug!(key, previous_owner = %existing.owner, "Taking over expired lock");
        }

        held.insert(
            key.to_string(),
            LockEntry {
                owner: *owner,
                expires_at: lock_expiry(now, hold),
            },
        );
        Ok(true)
    }

    fn release(&self, key: &str, owner: &LockOwner) -> QueryCacheResult<bool> {
        let mut held = recover(self.held.lock(), "release");
        let owned = held.get(key).is_some_and(|entry| entry.owner == *owner);
        if owned {
            held.remove(key);
            self.released.notify_all();
        }
        Ok(owned)
    }

    fn wait_for_release(&self, key: &str, timeout: Duration) {
        let held = recover(self.held.lock(), "wait_for_release");
        let Some(entry) = held.get(key).copied() else {
            return;
        };
        // Wake up no later than the holder's expiry.
        let until_expiry = (entry.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let _woken = recover(
            self.released.wait_timeout(held, timeout.min(until_expiry)),
            "wait_for_release",
        );
    }
}

/// A process-local cache store.
///
/// Created with [`MemoryStore::new`] it supports atomic locks; created with
/// [`MemoryStore::without_locks`] it does not, which is how a plain
/// key/value backend presents itself to the decorator.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<String, Entry>>,
    locks: Option<LockTable>,
}

impl MemoryStore {
    /// A lock-capable store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            locks: Some(LockTable::default()),
        }
    }

    /// A store without atomic-lock support.
    pub fn without_locks(name: impl Into<String>) -> Self {
        Self {
            locks: None,
            ..Self::new(name)
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        recover(self.entries.read(), "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry. Held locks are unaffected.
    pub fn flush(&self) {
        recover(self.entries.write(), "flush").clear();
    }

    /// Absolute expiry of the entry under `key`, if live.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        recover(self.entries.read(), "expires_at")
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at)
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Utc::now();
        {
            let entries = recover(self.entries.read(), "get");
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict under the write lock, unless it was refreshed meanwhile.
        let mut entries = recover(self.entries.write(), "evict");
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        None
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn has(&self, key: &str) -> QueryCacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    fn get(&self, key: &str) -> QueryCacheResult<Option<Vec<u8>>> {
        Ok(self.live(key))
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: &Ttl) -> QueryCacheResult<()> {
        let mut entries = recover(self.entries.write(), "put");
        match ttl.expires_at(Utc::now()) {
            Some(expires_at) => {
                entries.insert(key.to_string(), Entry { value, expires_at });
            }
            None => {
                debug!(key, "TTL already elapsed, removing entry");
                entries.remove(key);
            }
        }
        Ok(())
    }

    fn forget(&self, key: &str) -> QueryCacheResult<bool> {
        Ok(recover(self.entries.write(), "forget").remove(key).is_some())
    }

    fn lock_provider(&self) -> Option<&dyn LockProvider> {
        self.locks.as_ref().map(|locks| locks as &dyn LockProvider)
    }
}
