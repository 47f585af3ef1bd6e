//! Error types for querycache operations

use std::time::Duration;
use thiserror::Error;

/// Decorator misuse and routing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("This query is already wrapped in a cache proxy.")]
    AlreadyWrapped,

    #[error("The [{store}] cache does not support atomic locks.")]
    StoreNotLockable { store: String },

    #[error("Terminal call {method} expected {expected} but the executor returned {found}")]
    UnexpectedResult {
        method: String,
        expected: String,
        found: String,
    },

    #[error("Call {method} cannot be forwarded as a {kind} call")]
    UnroutableCall { method: String, kind: String },

    #[error("Invalid argument to {method}: {reason}")]
    InvalidArgument { method: String, reason: String },
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Timed out after {waited:?} waiting for lock on {key}")]
    LockTimeout { key: String, waited: Duration },

    #[error("Lock on {key} is not held by this owner")]
    LockNotHeld { key: String },

    #[error("Cache store lock poisoned")]
    LockPoisoned,

    #[error("Cache store {store} failed: {reason}")]
    Backend { store: String, reason: String },
}

/// Errors raised by the underlying query executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Query failed [{sql}]: {reason}")]
    QueryFailed { sql: String, reason: String },

    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Relation {relation} is not defined on {table}")]
    UnknownRelation { table: String, relation: String },

    #[error("Unsupported by executor: {reason}")]
    Unsupported { reason: String },

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },
}

/// Cache envelope encoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Failed to encode cache envelope: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode cache envelope: {reason}")]
    Decode { reason: String },

    #[error("Failed to canonicalize query: {reason}")]
    Canonicalize { reason: String },

    #[error("Cached {found} cannot be returned where {expected} is expected")]
    ShapeMismatch { expected: String, found: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all querycache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryCacheError {
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for querycache operations.
pub type QueryCacheResult<T> = Result<T, QueryCacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_wrapped_display() {
        let msg = ProxyError::AlreadyWrapped.to_string();
        assert_eq!(msg, "This query is already wrapped in a cache proxy.");
    }

    #[test]
    fn test_store_not_lockable_names_store() {
        let err = ProxyError::StoreNotLockable {
            store: "foo".to_string(),
        };
        assert_eq!(err.to_string(), "The [foo] cache does not support atomic locks.");
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = StoreError::LockTimeout {
            key: "cache-query|abc".to_string(),
            waited: Duration::from_secs(30),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("cache-query|abc"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "namespace".to_string(),
            value: "".to_string(),
            reason: "must not be empty".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("namespace"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_master_error_from_variants() {
        let proxy = QueryCacheError::from(ProxyError::AlreadyWrapped);
        assert!(matches!(proxy, QueryCacheError::Proxy(_)));

        let store = QueryCacheError::from(StoreError::LockPoisoned);
        assert!(matches!(store, QueryCacheError::Store(_)));

        let executor = QueryCacheError::from(ExecutorError::ConnectionLost {
            reason: "reset".to_string(),
        });
        assert!(matches!(executor, QueryCacheError::Executor(_)));

        let envelope = QueryCacheError::from(EnvelopeError::Decode {
            reason: "eof".to_string(),
        });
        assert!(matches!(envelope, QueryCacheError::Envelope(_)));

        let config = QueryCacheError::from(ConfigError::InvalidValue {
            field: "default_ttl".to_string(),
            value: "0s".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, QueryCacheError::Config(_)));
    }
}
