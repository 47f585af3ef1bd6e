//! querycache Test Utilities
//!
//! Centralized test infrastructure for the querycache workspace:
//! - An in-memory relational executor and a recording cache store
//! - Proptest generators for query definitions and results
//! - Test fixtures for a small blog schema
//! - Custom assertions for cache keys and cached envelopes

mod database;
mod spy;

pub use database::{MemoryDatabase, RelationDef};
pub use spy::{SpyStore, StoreCall};

// Re-export core types for convenience
pub use querycache_core::{
    CacheDirective, CacheSettings, CachedEnvelope, Fingerprint, QueryCacheError, QueryCacheResult,
    QueryDefinition, QueryResult, Record, Retrieval, Ttl, Value,
};
pub use querycache_proxy::{Cacheable, Connection, QueryBuilder, Terminal};
pub use querycache_storage::{CacheStore, MemoryStore};

/// Enable log output for tests, honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use querycache_core::{
        Boolean, Direction, Operator, Order, Page, Predicate, QueryDefinition, QueryResult, Record,
        Value,
    };

    pub fn arb_column() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("id".to_string()),
            Just("name".to_string()),
            Just("email".to_string()),
            Just("age".to_string()),
            Just("created_at".to_string()),
        ]
    }

    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e6f64..1.0e6).prop_map(Value::Float),
            "[a-z]{0,12}".prop_map(Value::Text),
        ]
    }

    pub fn arb_operator() -> impl Strategy<Value = Operator> {
        prop_oneof![
            Just(Operator::Eq),
            Just(Operator::NotEq),
            Just(Operator::Lt),
            Just(Operator::Lte),
            Just(Operator::Gt),
            Just(Operator::Gte),
            Just(Operator::Like),
        ]
    }

    pub fn arb_boolean() -> impl Strategy<Value = Boolean> {
        prop_oneof![Just(Boolean::And), Just(Boolean::Or)]
    }

    pub fn arb_predicate() -> impl Strategy<Value = Predicate> {
        prop_oneof![
            (arb_column(), arb_operator(), arb_value(), arb_boolean()).prop_map(
                |(column, operator, value, boolean)| Predicate::Compare {
                    column,
                    operator,
                    value,
                    boolean,
                }
            ),
            (
                arb_column(),
                prop::collection::vec(arb_value(), 0..4),
                any::<bool>(),
                arb_boolean()
            )
                .prop_map(|(column, values, negated, boolean)| Predicate::In {
                    column,
                    values,
                    negated,
                    boolean,
                }),
            (arb_column(), any::<bool>(), arb_boolean()).prop_map(|(column, negated, boolean)| {
                Predicate::Null {
                    column,
                    negated,
                    boolean,
                }
            }),
        ]
    }

    pub fn arb_order() -> impl Strategy<Value = Order> {
        (
            arb_column(),
            prop_oneof![Just(Direction::Asc), Just(Direction::Desc)],
        )
            .prop_map(|(column, direction)| Order { column, direction })
    }

    pub fn arb_columns() -> impl Strategy<Value = Option<Vec<String>>> {
        prop::option::of(prop::collection::vec(arb_column(), 1..4))
    }

    /// A query definition without eager loads.
    pub fn arb_query_definition() -> impl Strategy<Value = QueryDefinition> {
        (
            prop_oneof![Just("users".to_string()), Just("posts".to_string())],
            arb_columns(),
            prop::collection::vec(arb_predicate(), 0..5),
            prop::collection::vec(arb_order(), 0..3),
            prop::option::of(1u64..100),
            prop::option::of(0u64..100),
        )
            .prop_map(|(table, columns, wheres, orders, limit, offset)| {
                let mut query = QueryDefinition::new(table);
                query.columns = columns;
                query.wheres = wheres;
                query.orders = orders;
                query.limit = limit;
                query.offset = offset;
                query
            })
    }

    pub fn arb_record() -> impl Strategy<Value = Record> {
        (1i64..10_000, "[a-z]{1,10}", prop::option::of(0i64..120)).prop_map(|(id, name, age)| {
            Record::new().with("id", id).with("name", name).with("age", age)
        })
    }

    pub fn arb_query_result() -> impl Strategy<Value = QueryResult> {
        prop_oneof![
            prop::option::of(arb_record()).prop_map(QueryResult::Record),
            prop::collection::vec(arb_record(), 0..5).prop_map(QueryResult::Rows),
            (prop::collection::vec(arb_record(), 0..5), 0u64..100, 1u64..50, 1u64..10).prop_map(
                |(items, total, per_page, current_page)| QueryResult::Page(Page {
                    items,
                    total,
                    per_page,
                    current_page,
                })
            ),
            any::<i64>().prop_map(|n| QueryResult::Scalar(Value::Int(n))),
            any::<u64>().prop_map(QueryResult::Affected),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use crate::MemoryDatabase;
    use querycache_core::Record;
    use querycache_proxy::Connection;
    use querycache_storage::CacheStore;
    use std::sync::Arc;

    /// Users, posts and comments with `users.posts`, `posts.comments` and
    /// `posts.author` relations.
    ///
    /// - users 1 (ada), 2 (grace), 3 (linus)
    /// - posts 1, 2 by ada, post 3 by grace
    /// - comments 1, 2 on post 1, comment 3 on post 3
    pub fn blog() -> Arc<MemoryDatabase> {
        let db = MemoryDatabase::new();

        for (id, name, age) in [(1, "ada", 36), (2, "grace", 85), (3, "linus", 54)] {
            db.insert(
                "users",
                Record::new()
                    .with("id", id)
                    .with("name", name)
                    .with("email", format!("{}@example.com", name))
                    .with("age", age),
            );
        }

        for (id, user_id, title, likes) in [
            (1, 1, "Notes on the Analytical Engine", 10),
            (2, 1, "Bernoulli numbers", 3),
            (3, 2, "Compilers", 7),
        ] {
            db.insert(
                "posts",
                Record::new()
                    .with("id", id)
                    .with("user_id", user_id)
                    .with("title", title)
                    .with("likes", likes),
            );
        }

        for (id, post_id, body) in [(1, 1, "First!"), (2, 1, "Brilliant"), (3, 3, "Nice")] {
            db.insert(
                "comments",
                Record::new()
                    .with("id", id)
                    .with("post_id", post_id)
                    .with("body", body),
            );
        }

        db.has_many("users", "posts", "posts", "user_id");
        db.has_many("posts", "comments", "comments", "post_id");
        db.belongs_to("posts", "author", "users", "user_id");

        Arc::new(db)
    }

    /// A connection over `db` and `store` with default settings.
    pub fn connection(db: Arc<MemoryDatabase>, store: Arc<dyn CacheStore>) -> Arc<Connection> {
        Arc::new(Connection::new(db, store))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use querycache_core::{CachedEnvelope, Fingerprint, QueryCacheError, QueryCacheResult};
    use querycache_storage::CacheStore;

    /// Assert a fingerprint has the `<namespace>|<24-char base64>` shape.
    pub fn assert_hashed_key(fingerprint: &Fingerprint, namespace: &str) {
        let (prefix, encoded) = fingerprint
            .as_str()
            .split_once('|')
            .unwrap_or_else(|| panic!("Fingerprint without separator: {}", fingerprint));
        assert_eq!(prefix, namespace, "Unexpected namespace in {}", fingerprint);
        assert_eq!(encoded.len(), 24, "Unexpected digest length in {}", fingerprint);
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='),
            "Digest is not base64: {}",
            fingerprint
        );
    }

    /// Assert the store holds a decodable envelope under `key` and return it.
    pub fn assert_cached(store: &dyn CacheStore, key: &str) -> CachedEnvelope {
        assert!(store.has(key).unwrap(), "Expected a cache entry under {}", key);
        let bytes = store
            .get(key)
            .unwrap()
            .unwrap_or_else(|| panic!("Entry under {} vanished", key));
        CachedEnvelope::from_bytes(&bytes)
            .unwrap_or_else(|e| panic!("Entry under {} is not an envelope: {}", key, e))
    }

    pub fn assert_not_cached(store: &dyn CacheStore, key: &str) {
        assert!(!store.has(key).unwrap(), "Unexpected cache entry under {}", key);
    }

    /// Assert that a result is an error matching the predicate.
    pub fn assert_err_matches<T: std::fmt::Debug>(
        result: &QueryCacheResult<T>,
        predicate: impl FnOnce(&QueryCacheError) -> bool,
    ) {
        match result {
            Err(e) => assert!(predicate(e), "Unexpected error: {:?}", e),
            Ok(v) => panic!("Expected an error, got {:?}", v),
        }
    }
}
