//! Property tests for the in-memory store.

use proptest::prelude::*;
use querycache_core::Ttl;
use querycache_storage::{CacheStore, LockProvider, MemoryStore};
use std::collections::HashMap;
use std::time::Duration;

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z]{1,4}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: with a live TTL the store behaves like a map, last write wins.
    #[test]
    fn prop_store_matches_model(
        ops in prop::collection::vec(
            (arb_key(), prop::option::of(prop::collection::vec(any::<u8>(), 0..16))),
            1..40,
        ),
    ) {
        let store = MemoryStore::new("memory");
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();

        for (key, value) in ops {
            match value {
                Some(bytes) => {
                    store.put(&key, bytes.clone(), &Ttl::seconds(3600)).unwrap();
                    model.insert(key, bytes);
                }
                None => {
                    let removed = store.forget(&key).unwrap();
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                }
            }
        }

        prop_assert_eq!(store.len(), model.len());
        for (key, bytes) in &model {
            prop_assert!(store.has(key).unwrap());
            let stored = store.get(key).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(bytes));
        }
    }

    /// Property: a held lock excludes every other owner until released.
    #[test]
    fn prop_lock_excludes_other_owners(key in arb_key(), contenders in 1usize..6) {
        let store = MemoryStore::new("memory");
        let provider: &dyn LockProvider = store.lock_provider().unwrap();

        let held = provider
            .lock(&key, Duration::from_secs(10))
            .block(Duration::ZERO)
            .unwrap();
        for _ in 0..contenders {
            let attempt = provider.lock(&key, Duration::from_secs(10)).block(Duration::ZERO);
            prop_assert!(attempt.is_err());
        }
        held.release().unwrap();

        prop_assert!(provider
            .lock(&key, Duration::from_secs(10))
            .block(Duration::ZERO)
            .is_ok());
    }
}
