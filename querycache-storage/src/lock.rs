//! Lock typestate for the lifecycle of a store lock.
//!
//! A lock can only be released once it has been acquired, and acquiring
//! consumes the pending handle.
//!
//! # State Transition Diagram
//!
//! ```text
//! lock() ──→ PendingLock ─── block(wait) ──→ HeldLock ─── release() ──→ (unlocked)
//!                 │                              │
//!             timeout → Err                   drop → release
//! ```

use crate::traits::LockProvider;
use querycache_core::{QueryCacheResult, StoreError};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifies one holder of a lock. Only the owner can release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockOwner(Uuid);

impl LockOwner {
    /// A fresh, time-ordered owner token.
    pub fn new() -> Self {
        LockOwner(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PENDING
// ============================================================================

/// A lock that has been named but not yet acquired.
pub struct PendingLock<'a> {
    provider: &'a dyn LockProvider,
    key: String,
    owner: LockOwner,
    hold: Duration,
}

impl<'a> PendingLock<'a> {
    pub fn new(provider: &'a dyn LockProvider, key: impl Into<String>, hold: Duration) -> Self {
        Self {
            provider,
            key: key.into(),
            owner: LockOwner::new(),
            hold,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    /// Acquire the lock, blocking for at most `wait`.
    ///
    /// Fails with [`StoreError::LockTimeout`] when the lock is still taken
    /// after `wait` has elapsed. At least one attempt is always made.
    pub fn block(self, wait: Duration) -> QueryCacheResult<HeldLock<'a>> {
        let started = Instant::now();
        let deadline = started + wait;

        loop {
            if self.provider.try_acquire(&self.key, &self.owner, self.hold)? {
                debug!(key = %self.key, owner = %self.owner, waited = ?started.elapsed(), "Lock acquired");
                return Ok(HeldLock {
                    provider: self.provider,
                    key: self.key,
                    owner: self.owner,
                    released: false,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::LockTimeout {
                    key: self.key,
                    waited: wait,
                }
                .into());
            }
            self.provider.wait_for_release(&self.key, deadline - now);
        }
    }
}

impl fmt::Debug for PendingLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLock")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("hold", &self.hold)
            .finish()
    }
}

// ============================================================================
// HELD
// ============================================================================

/// An acquired lock.
///
/// Dropping it releases the lock; call [`HeldLock::release`] to observe
/// release failures instead of having them logged.
pub struct HeldLock<'a> {
    provider: &'a dyn LockProvider,
    key: String,
    owner: LockOwner,
    released: bool,
}

impl HeldLock<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> LockOwner {
        self.owner
    }

    /// Release the lock, consuming it.
    ///
    /// Fails with [`StoreError::LockNotHeld`] if the lock expired and was
    /// taken over in the meantime.
    pub fn release(mut self) -> QueryCacheResult<()> {
        self.released = true;
        self.release_inner()
    }

    fn release_inner(&self) -> QueryCacheResult<()> {
        if self.provider.release(&self.key, &self.owner)? {
            debug!(key = %self.key, owner = %self.owner, "Lock released");
            Ok(())
        } else {
            Err(StoreError::LockNotHeld {
                key: self.key.clone(),
            }
            .into())
        }
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.release_inner() {
            warn!(key = %self.key, owner = %self.owner, error = %e, "Failed to release lock on drop");
        }
    }
}

impl fmt::Debug for HeldLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldLock")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querycache_core::QueryCacheError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Single-threaded provider that counts attempts.
    #[derive(Default)]
    struct CountingProvider {
        held: Mutex<HashMap<String, LockOwner>>,
        attempts: Mutex<u32>,
    }

    impl LockProvider for CountingProvider {
        fn try_acquire(&self, key: &str, owner: &LockOwner, _hold: Duration) -> QueryCacheResult<bool> {
            *self.attempts.lock().unwrap() += 1;
            let mut held = self.held.lock().unwrap();
            if held.contains_key(key) {
                return Ok(false);
            }
            held.insert(key.to_string(), *owner);
            Ok(true)
        }

        fn release(&self, key: &str, owner: &LockOwner) -> QueryCacheResult<bool> {
            let mut held = self.held.lock().unwrap();
            if held.get(key) == Some(owner) {
                held.remove(key);
                Ok(true)
            } else {
                Ok(false)
            }
        }

        fn wait_for_release(&self, _key: &str, _timeout: Duration) {}
    }

    #[test]
    fn test_block_then_release() {
        let provider = CountingProvider::default();
        let lock = PendingLock::new(&provider, "k", Duration::from_secs(1))
            .block(Duration::from_secs(1))
            .unwrap();
        assert_eq!(lock.key(), "k");
        lock.release().unwrap();
        assert!(provider.held.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_releases() {
        let provider = CountingProvider::default();
        {
            let _lock = PendingLock::new(&provider, "k", Duration::from_secs(1))
                .block(Duration::ZERO)
                .unwrap();
            assert_eq!(provider.held.lock().unwrap().len(), 1);
        }
        assert!(provider.held.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_wait_makes_one_attempt() {
        let provider = CountingProvider::default();
        provider
            .held
            .lock()
            .unwrap()
            .insert("k".to_string(), LockOwner::new());

        let err = PendingLock::new(&provider, "k", Duration::from_secs(1))
            .block(Duration::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            QueryCacheError::Store(StoreError::LockTimeout { .. })
        ));
        assert_eq!(*provider.attempts.lock().unwrap(), 1);
    }

    #[test]
    fn test_release_of_stolen_lock_fails() {
        let provider = CountingProvider::default();
        let lock = PendingLock::new(&provider, "k", Duration::from_secs(1))
            .block(Duration::ZERO)
            .unwrap();
        provider
            .held
            .lock()
            .unwrap()
            .insert("k".to_string(), LockOwner::new());

        assert!(matches!(
            lock.release(),
            Err(QueryCacheError::Store(StoreError::LockNotHeld { .. }))
        ));
    }

    #[test]
    fn test_owner_tokens_are_unique() {
        assert_ne!(LockOwner::new(), LockOwner::new());
    }
}
