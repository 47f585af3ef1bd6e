//! Cache directives: how long, under which key, and whether to lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time-to-live handed to the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    /// Expire after a relative duration.
    For(Duration),
    /// Expire at an absolute point in time.
    Until(DateTime<Utc>),
}

impl Ttl {
    pub fn seconds(secs: u64) -> Self {
        Ttl::For(Duration::from_secs(secs))
    }

    /// Absolute expiry for an entry written at `now`.
    ///
    /// Returns `None` when the entry is already expired (zero duration or
    /// an instant that is not in the future). Durations past the end of the
    /// calendar saturate to [`DateTime::MAX_UTC`].
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Ttl::For(duration) if duration.is_zero() => None,
            Ttl::For(duration) => Some(
                chrono::Duration::from_std(*duration)
                    .ok()
                    .and_then(|delta| now.checked_add_signed(delta))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            Ttl::Until(at) => (*at > now).then_some(*at),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::For(duration)
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(at: DateTime<Utc>) -> Self {
        Ttl::Until(at)
    }
}

/// Caching parameters fixed at the moment a query is wrapped.
///
/// - `ttl = None` uses the configured default TTL.
/// - `key = None` derives the key from the query fingerprint.
/// - `wait = None` skips the atomic lock entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDirective {
    ttl: Option<Ttl>,
    key: Option<String>,
    wait: Option<Duration>,
}

impl CacheDirective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Serialize the call under a lock, waiting up to `wait` for it. A zero
    /// wait makes one attempt and fails at once if the lock is taken.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn ttl(&self) -> Option<&Ttl> {
        self.ttl.as_ref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn wait(&self) -> Option<Duration> {
        self.wait
    }

    /// The TTL to store with, falling back to `default`.
    pub fn resolved_ttl(&self, default: Duration) -> Ttl {
        self.ttl.clone().unwrap_or(Ttl::For(default))
    }
}
