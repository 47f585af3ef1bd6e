//! Eager-load propagator.
//!
//! Executors hand every relation sub-query to a [`RelationLoader`]. The
//! propagator is that loader: a relation whose constraint called `cache()`
//! runs through its own [`CachedQuery`], the rest run directly. Either way the
//! propagator is passed down again, so nested relations at any depth get the
//! same treatment.

use crate::connection::Connection;
use crate::decorator::CachedQuery;
use crate::executor::{RelationFetch, RelationLoader};
use crate::query::{Query, Terminal};
use querycache_core::{EagerLoad, QueryCacheResult, QueryDefinition, Record};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Routes relation fetches through the cache where the caller asked for it.
#[derive(Debug)]
pub struct EagerLoadPropagator<'a> {
    connection: &'a Arc<Connection>,
}

impl<'a> EagerLoadPropagator<'a> {
    pub fn new(connection: &'a Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Dotted paths of every relation in the graph that carries its own
    /// cache directive, depth first.
    pub fn cached_paths(definition: &QueryDefinition) -> Vec<String> {
        fn walk(prefix: &str, loads: &BTreeMap<String, EagerLoad>, out: &mut Vec<String>) {
            for (name, node) in loads {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                if node.is_cached() {
                    out.push(path.clone());
                }
                walk(&path, &node.constraint.eager_loads, out);
            }
        }
        let mut out = Vec::new();
        walk("", &definition.eager_loads, &mut out);
        out
    }
}

impl RelationLoader for EagerLoadPropagator<'_> {
    fn load(&self, fetch: RelationFetch) -> QueryCacheResult<Vec<Record>> {
        let query = Query::from_definition(Arc::clone(self.connection), fetch.query);
        match fetch.directive {
            Some(directive) => {
                debug!(relation = %fetch.path, table = query.from(), "Loading relation through cache");
                CachedQuery::new(query, directive).get()
            }
            None => query.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querycache_core::CacheDirective;

    #[test]
    fn test_cached_paths_walks_nested_graph() {
        let mut definition = QueryDefinition::new("users");
        definition.eager_load_entry("posts");
        definition.eager_load_entry("posts.comments").directive = Some(CacheDirective::new());
        definition.eager_load_entry("profile").directive = Some(CacheDirective::new());

        assert_eq!(
            EagerLoadPropagator::cached_paths(&definition),
            vec!["posts.comments".to_string(), "profile".to_string()]
        );
    }

    #[test]
    fn test_cached_paths_empty_without_directives() {
        let mut definition = QueryDefinition::new("users");
        definition.eager_load_entry("posts.comments");
        assert!(EagerLoadPropagator::cached_paths(&definition).is_empty());
    }
}
