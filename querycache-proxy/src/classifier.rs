//! Call classifier: decides how the decorator routes a call by method name.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// How the decorator treats an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Forwarded to the wrapped query unchanged.
    PassThroughProperty,
    /// Changes or reads the definition; never touches the cache.
    BuilderMutator,
    /// Executes the query through the cached-execution protocol.
    Terminal,
    /// Attaching a cache to an already decorated query.
    ReAttachRejected,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::PassThroughProperty => "pass-through",
            CallKind::BuilderMutator => "builder",
            CallKind::Terminal => "terminal",
            CallKind::ReAttachRejected => "re-attach",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static DECISIONS: Lazy<HashMap<&'static str, CallKind>> = Lazy::new(|| {
    use CallKind::*;

    let mut table = HashMap::new();

    for method in ["connection", "from", "set_from", "set_bindings"] {
        table.insert(method, PassThroughProperty);
    }

    for method in [
        // Chainable
        "where",
        "where_eq",
        "where_op",
        "or_where",
        "where_in",
        "where_not_in",
        "where_null",
        "where_not_null",
        "where_key",
        "where_raw",
        "where_predicate",
        "select",
        "add_select",
        "order_by",
        "latest",
        "limit",
        "take",
        "offset",
        "skip",
        "for_page",
        "with",
        "with_constraint",
        // Derived values
        "to_sql",
        "bindings",
        "eager_loads",
        "definition",
    ] {
        table.insert(method, BuilderMutator);
    }

    for method in [
        "first",
        "find",
        "get",
        "paginate",
        "count",
        "exists",
        "sum",
        "max",
        "min",
        "increment",
        "decrement",
        "update",
    ] {
        table.insert(method, Terminal);
    }

    for method in ["cache", "cache_with"] {
        table.insert(method, ReAttachRejected);
    }

    table
});

/// Classify a call on a decorated query.
///
/// Names missing from the decision table pass through unchanged.
pub fn classify(method: &str) -> CallKind {
    DECISIONS
        .get(method)
        .copied()
        .unwrap_or(CallKind::PassThroughProperty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        for method in ["first", "get", "paginate", "count", "increment", "update"] {
            assert_eq!(classify(method), CallKind::Terminal, "{}", method);
        }
    }

    #[test]
    fn test_inspection_never_executes() {
        assert_eq!(classify("to_sql"), CallKind::BuilderMutator);
        assert_eq!(classify("bindings"), CallKind::BuilderMutator);
        assert_eq!(classify("eager_loads"), CallKind::BuilderMutator);
    }

    #[test]
    fn test_reattach() {
        assert_eq!(classify("cache"), CallKind::ReAttachRejected);
        assert_eq!(classify("cache_with"), CallKind::ReAttachRejected);
    }

    /// Builder that records the method name of every hook call.
    struct Recorder {
        definition: querycache_core::QueryDefinition,
        methods: Vec<&'static str>,
    }

    impl querycache_core::QueryBuilder for Recorder {
        fn mutate<F>(mut self, method: &'static str, apply: F) -> Self
        where
            F: FnOnce(&mut querycache_core::QueryDefinition),
        {
            apply(&mut self.definition);
            self.methods.push(method);
            self
        }

        fn inspect<R, F>(&self, _method: &'static str, read: F) -> R
        where
            F: FnOnce(&querycache_core::QueryDefinition) -> R,
        {
            read(&self.definition)
        }
    }

    #[test]
    fn test_every_builder_method_is_a_mutator() {
        use querycache_core::{Direction, Operator, Predicate, QueryBuilder, QueryDefinition};

        let recorder = Recorder {
            definition: QueryDefinition::new("users"),
            methods: Vec::new(),
        }
        .where_eq("id", 1)
        .where_op("age", Operator::Gt, 30)
        .or_where("name", Operator::Like, "a%")
        .where_in("id", [1, 2])
        .where_not_in("id", [3])
        .where_null("deleted_at")
        .where_not_null("email")
        .where_key(1)
        .where_raw("1 = 1", vec![])
        .where_predicate(Predicate::Group {
            predicates: vec![],
            boolean: querycache_core::Boolean::And,
        })
        .select(["id"])
        .add_select("name")
        .order_by("id", Direction::Asc)
        .latest("created_at")
        .take(1)
        .skip(1)
        .for_page(2, 10)
        .with("posts")
        .with_constraint("comments", |c| c);

        assert!(!recorder.methods.is_empty());
        for method in &recorder.methods {
            assert_eq!(classify(method), CallKind::BuilderMutator, "{}", method);
        }
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(classify("connection"), CallKind::PassThroughProperty);
        assert_eq!(classify("grammar"), CallKind::PassThroughProperty);
        assert_eq!(classify(""), CallKind::PassThroughProperty);
    }
}
