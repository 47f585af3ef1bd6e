//! Fingerprint encoder: query definition in, stable cache key out.
//!
//! # Key Format
//!
//! ```text
//! <namespace>|<pinned key>                  when the directive pins a key
//! <namespace>|base64(sha256(canonical)[..16])  otherwise
//! ```
//!
//! The canonical form is a JSON document assembled section by section (table,
//! predicate tree, typed bindings, projection, ordering, limit/offset, page,
//! aggregate/write, eager loads sorted by relation name). Because every
//! section has a fixed slot, the interleaving of builder calls never changes
//! the key, while any difference in what the query returns does.

use crate::definition::{Order, QueryDefinition};
use crate::directive::CacheDirective;
use crate::error::EnvelopeError;
use crate::pagination::{NoPagination, PaginationContext};
use crate::retrieval::{Aggregate, Retrieval, RetrievalShape, Write};
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Separator between namespace and encoded part.
pub const SEPARATOR: char = '|';

/// Number of digest bytes kept in the key.
const DIGEST_LEN: usize = 16;

/// A cache key derived from a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// A fingerprint for a caller-pinned key, used verbatim.
    pub fn pinned(namespace: &str, key: &str) -> Self {
        Fingerprint(format!("{}{}{}", namespace, SEPARATOR, key))
    }

    /// A fingerprint over a canonical byte sequence.
    pub fn hashed(namespace: &str, canonical: &[u8]) -> Self {
        Fingerprint(format!("{}{}{}", namespace, SEPARATOR, digest(canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash bytes into the short encoded part of a key.
pub fn digest(canonical: &[u8]) -> String {
    let hash = Sha256::digest(canonical);
    STANDARD.encode(&hash[..DIGEST_LEN])
}

/// Compute the fingerprint of a terminal call.
///
/// A pinned `directive.key` overrides everything, including nested eager-load
/// state.
pub fn fingerprint(
    query: &QueryDefinition,
    directive: &CacheDirective,
    retrieval: &Retrieval,
    pagination: &dyn PaginationContext,
    namespace: &str,
) -> Result<Fingerprint, EnvelopeError> {
    if let Some(key) = directive.key() {
        return Ok(Fingerprint::pinned(namespace, key));
    }
    let canonical = canonical_form(query, retrieval, pagination)?;
    Ok(Fingerprint::hashed(namespace, &canonical))
}

/// Canonical byte form of a query plus its retrieval shape.
pub fn canonical_form(
    query: &QueryDefinition,
    retrieval: &Retrieval,
    pagination: &dyn PaginationContext,
) -> Result<Vec<u8>, EnvelopeError> {
    let shape = retrieval.shape(query, pagination);
    let canonical = CanonicalQuery::new(query, &shape);
    serde_json::to_vec(&canonical).map_err(|e| EnvelopeError::Canonicalize {
        reason: e.to_string(),
    })
}

// ============================================================================
// CANONICAL FORM
// ============================================================================

#[derive(Serialize)]
struct CanonicalQuery<'a> {
    table: &'a str,
    wheres: String,
    bindings: Vec<Value>,
    /// `null` when no projection was chosen, which never equals any list.
    columns: Option<Vec<String>>,
    orders: &'a [Order],
    limit: Option<u64>,
    offset: Option<u64>,
    page: Option<(u64, u64)>,
    aggregate: Option<(Aggregate, Option<String>)>,
    write: Option<Write>,
    with: BTreeMap<&'a str, CanonicalRelation<'a>>,
}

#[derive(Serialize)]
struct CanonicalRelation<'a> {
    cache: Option<&'a CacheDirective>,
    query: CanonicalQuery<'a>,
}

impl<'a> CanonicalQuery<'a> {
    fn new(query: &'a QueryDefinition, shape: &RetrievalShape) -> Self {
        let with = query
            .eager_loads
            .iter()
            .map(|(name, node)| {
                // Relations are always loaded as collections.
                let nested = Retrieval::get().shape(&node.constraint, &NoPagination);
                (
                    name.as_str(),
                    CanonicalRelation {
                        cache: node.directive.as_ref(),
                        query: CanonicalQuery::new(&node.constraint, &nested),
                    },
                )
            })
            .collect();

        Self {
            table: &query.table,
            wheres: query.compile_wheres(),
            bindings: query.bindings(),
            columns: shape.columns.clone(),
            orders: &query.orders,
            limit: shape.limit,
            offset: shape.offset,
            page: shape.page,
            aggregate: shape.aggregate.clone(),
            write: shape.write.clone(),
            with,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Boolean, Direction, Operator, Predicate};
    use crate::pagination::FixedPage;
    use std::time::Duration;

    fn users_where_id(id: i64) -> QueryDefinition {
        let mut query = QueryDefinition::new("users");
        query.wheres.push(Predicate::Compare {
            column: "id".into(),
            operator: Operator::Eq,
            value: Value::Int(id),
            boolean: Boolean::And,
        });
        query
    }

    fn key(query: &QueryDefinition, retrieval: &Retrieval) -> Fingerprint {
        fingerprint(
            query,
            &CacheDirective::new(),
            retrieval,
            &NoPagination,
            "cache-query",
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = key(&users_where_id(1), &Retrieval::first());
        let (namespace, encoded) = fp.as_str().split_once('|').unwrap();
        assert_eq!(namespace, "cache-query");
        // 16 bytes of digest encode to 24 base64 characters.
        assert_eq!(encoded.len(), 24);
        assert!(encoded.ends_with("=="));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = key(&users_where_id(1), &Retrieval::first());
        let b = key(&users_where_id(1), &Retrieval::first());
        assert_eq!(a, b);
    }

    #[test]
    fn test_pinned_key_is_verbatim() {
        let directive = CacheDirective::new().with_key("foo");
        let fp = fingerprint(
            &users_where_id(1),
            &directive,
            &Retrieval::first(),
            &NoPagination,
            "cache-query",
        )
        .unwrap();
        assert_eq!(fp.as_str(), "cache-query|foo");

        let other = fingerprint(
            &QueryDefinition::new("posts"),
            &directive,
            &Retrieval::get(),
            &FixedPage(9),
            "cache-query",
        )
        .unwrap();
        assert_eq!(fp, other);
    }

    #[test]
    fn test_bindings_are_typed() {
        let mut text = QueryDefinition::new("users");
        text.wheres.push(Predicate::Compare {
            column: "id".into(),
            operator: Operator::Eq,
            value: Value::Text("1".into()),
            boolean: Boolean::And,
        });
        assert_ne!(
            key(&users_where_id(1), &Retrieval::first()),
            key(&text, &Retrieval::first())
        );
    }

    #[test]
    fn test_projection_changes_key() {
        let query = users_where_id(1);
        let name = key(
            &query,
            &Retrieval::First {
                columns: Some(vec!["name".into()]),
            },
        );
        let email = key(
            &query,
            &Retrieval::First {
                columns: Some(vec!["email".into()]),
            },
        );
        let none = key(&query, &Retrieval::first());
        let star = key(
            &query,
            &Retrieval::First {
                columns: Some(vec!["*".into()]),
            },
        );
        assert_ne!(name, email);
        assert_ne!(none, star);
        assert_ne!(none, name);
    }

    #[test]
    fn test_page_changes_key() {
        let query = QueryDefinition::new("users");
        let page = |n| Retrieval::Paginate {
            per_page: 1,
            page: Some(n),
            columns: None,
            page_name: "page".into(),
        };
        assert_ne!(key(&query, &page(1)), key(&query, &page(2)));
    }

    #[test]
    fn test_context_page_matches_explicit_page() {
        let query = QueryDefinition::new("users");
        let implicit = Retrieval::Paginate {
            per_page: 1,
            page: None,
            columns: None,
            page_name: "page".into(),
        };
        let explicit = Retrieval::Paginate {
            per_page: 1,
            page: Some(2),
            columns: None,
            page_name: "page".into(),
        };

        let from_context = fingerprint(
            &query,
            &CacheDirective::new(),
            &implicit,
            &FixedPage(2),
            "cache-query",
        )
        .unwrap();
        assert_eq!(from_context, key(&query, &explicit));
    }

    #[test]
    fn test_ordering_changes_key() {
        let plain = users_where_id(1);
        let mut ordered = users_where_id(1);
        ordered.orders.push(Order {
            column: "id".into(),
            direction: Direction::Desc,
        });
        assert_ne!(key(&plain, &Retrieval::get()), key(&ordered, &Retrieval::get()));
    }

    #[test]
    fn test_aggregate_does_not_collide_with_retrieval() {
        let query = users_where_id(1);
        let count = Retrieval::Aggregate {
            function: Aggregate::Count,
            column: None,
        };
        assert_ne!(key(&query, &count), key(&query, &Retrieval::get()));
    }

    #[test]
    fn test_nested_eager_load_state_changes_key() {
        let mut plain = users_where_id(1);
        plain.eager_load_entry("posts");

        let mut deeper = users_where_id(1);
        deeper.eager_load_entry("posts.comments");

        let mut cached = users_where_id(1);
        cached.eager_load_entry("posts").directive = Some(CacheDirective::new());

        let mut pinned = users_where_id(1);
        pinned.eager_load_entry("posts").directive =
            Some(CacheDirective::new().with_key("posts"));

        let mut longer = users_where_id(1);
        longer.eager_load_entry("posts").directive =
            Some(CacheDirective::new().with_ttl(Duration::from_secs(300)));

        let keys = [
            key(&users_where_id(1), &Retrieval::first()),
            key(&plain, &Retrieval::first()),
            key(&deeper, &Retrieval::first()),
            key(&cached, &Retrieval::first()),
            key(&pinned, &Retrieval::first()),
            key(&longer, &Retrieval::first()),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_eager_load_registration_order_is_irrelevant() {
        let mut a = users_where_id(1);
        a.eager_load_entry("posts");
        a.eager_load_entry("comments");

        let mut b = users_where_id(1);
        b.eager_load_entry("comments");
        b.eager_load_entry("posts");

        assert_eq!(key(&a, &Retrieval::first()), key(&b, &Retrieval::first()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            /// Property: distinct filter values never share a key.
            #[test]
            fn prop_distinct_ids_never_collide(a in any::<i64>(), b in any::<i64>()) {
                prop_assume!(a != b);
                prop_assert_ne!(
                    key(&users_where_id(a), &Retrieval::first()),
                    key(&users_where_id(b), &Retrieval::first())
                );
            }

            /// Property: an integer and its text rendering bind differently.
            #[test]
            fn prop_bindings_are_typed(n in any::<i64>()) {
                let mut text = users_where_id(n);
                text.wheres[0] = Predicate::Compare {
                    column: "id".into(),
                    operator: Operator::Eq,
                    value: Value::Text(n.to_string()),
                    boolean: Boolean::And,
                };
                prop_assert_ne!(
                    key(&users_where_id(n), &Retrieval::first()),
                    key(&text, &Retrieval::first())
                );
            }

            /// Property: a pinned key is used verbatim whatever the query.
            #[test]
            fn prop_pinned_key_is_verbatim(id in any::<i64>(), pinned in "[^|]{1,32}") {
                let directive = CacheDirective::new().with_key(pinned.clone());
                let fp = fingerprint(
                    &users_where_id(id),
                    &directive,
                    &Retrieval::get(),
                    &NoPagination,
                    "ns",
                )
                .expect("pinned keys never canonicalize");
                prop_assert_eq!(fp.into_string(), format!("ns|{}", pinned));
            }
        }
    }
}
