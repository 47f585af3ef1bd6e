//! The accumulated definition of a read query.
//!
//! A [`QueryDefinition`] is plain data: builder calls append to it and
//! executors read it. It compiles to SQL text for inspection, but nothing in
//! this crate ever runs it.

use crate::directive::CacheDirective;
use crate::error::ProxyError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// PREDICATES
// ============================================================================

/// How a predicate joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Boolean::And => "and",
            Boolean::Or => "or",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "like",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One node of the predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        column: String,
        operator: Operator,
        value: Value,
        boolean: Boolean,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
        boolean: Boolean,
    },
    Null {
        column: String,
        negated: bool,
        boolean: Boolean,
    },
    Group {
        predicates: Vec<Predicate>,
        boolean: Boolean,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: Boolean,
    },
}

impl Predicate {
    pub fn boolean(&self) -> Boolean {
        match self {
            Predicate::Compare { boolean, .. }
            | Predicate::In { boolean, .. }
            | Predicate::Null { boolean, .. }
            | Predicate::Group { boolean, .. }
            | Predicate::Raw { boolean, .. } => *boolean,
        }
    }

    /// Append this predicate's bound values, in SQL placeholder order.
    fn collect_bindings(&self, out: &mut Vec<Value>) {
        match self {
            Predicate::Compare { value, .. } => out.push(value.clone()),
            Predicate::In { values, .. } => out.extend(values.iter().cloned()),
            Predicate::Null { .. } => {}
            Predicate::Group { predicates, .. } => {
                for predicate in predicates {
                    predicate.collect_bindings(out);
                }
            }
            Predicate::Raw { bindings, .. } => out.extend(bindings.iter().cloned()),
        }
    }

    /// Overwrite this predicate's bound values from `values`, in placeholder order.
    fn rebind(&mut self, source: &mut impl Iterator<Item = Value>) {
        let slots: Vec<&mut Value> = match self {
            Predicate::Compare { value, .. } => vec![value],
            Predicate::In { values, .. } => values.iter_mut().collect(),
            Predicate::Raw { bindings, .. } => bindings.iter_mut().collect(),
            Predicate::Null { .. } => Vec::new(),
            Predicate::Group { predicates, .. } => {
                for predicate in predicates {
                    predicate.rebind(source);
                }
                Vec::new()
            }
        };
        for slot in slots {
            if let Some(value) = source.next() {
                *slot = value;
            }
        }
    }

    fn compile(&self) -> String {
        match self {
            Predicate::Compare {
                column, operator, ..
            } => format!("{} {} ?", quote(column), operator),
            Predicate::In {
                column,
                values,
                negated,
                ..
            } => {
                if values.is_empty() {
                    // An empty IN list matches nothing; NOT IN () matches everything.
                    return if *negated { "1 = 1" } else { "0 = 1" }.to_string();
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                let op = if *negated { "not in" } else { "in" };
                format!("{} {} ({})", quote(column), op, placeholders)
            }
            Predicate::Null {
                column, negated, ..
            } => {
                let op = if *negated { "is not null" } else { "is null" };
                format!("{} {}", quote(column), op)
            }
            Predicate::Group { predicates, .. } => format!("({})", compile_predicates(predicates)),
            Predicate::Raw { sql, .. } => sql.clone(),
        }
    }
}

fn compile_predicates(predicates: &[Predicate]) -> String {
    let mut sql = String::new();
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(predicate.boolean().as_sql());
            sql.push(' ');
        }
        sql.push_str(&predicate.compile());
    }
    sql
}

/// Quote an identifier, splitting `table.column` qualified names.
fn quote(identifier: &str) -> String {
    if identifier == "*" {
        return "*".to_string();
    }
    identifier
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

// ============================================================================
// ORDERING
// ============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// One `order by` term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

// ============================================================================
// EAGER LOADS
// ============================================================================

/// A node in the eager-load graph.
///
/// `constraint` shapes the relation's sub-query (its own predicates,
/// projection, ordering and nested eager loads). `directive` is set when the
/// caller wrapped the sub-query in its own cache call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EagerLoad {
    pub constraint: QueryDefinition,
    pub directive: Option<CacheDirective>,
}

impl EagerLoad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self) -> bool {
        self.directive.is_some()
    }

    /// Build the sub-query an executor runs to load this relation.
    ///
    /// The parent-key constraint comes first, followed by the caller's own
    /// constraint predicates.
    pub fn relation_query(
        &self,
        table: impl Into<String>,
        column: impl Into<String>,
        keys: Vec<Value>,
    ) -> QueryDefinition {
        let mut query = self.constraint.clone();
        query.table = table.into();
        query.wheres.insert(
            0,
            Predicate::In {
                column: column.into(),
                values: keys,
                negated: false,
                boolean: Boolean::And,
            },
        );
        query
    }
}

// ============================================================================
// QUERY DEFINITION
// ============================================================================

/// Everything a builder has accumulated for one query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub table: String,
    /// Explicit projection; `None` means no `select` call was made.
    pub columns: Option<Vec<String>>,
    pub wheres: Vec<Predicate>,
    pub orders: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub eager_loads: BTreeMap<String, EagerLoad>,
}

impl QueryDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Bound values in placeholder order.
    pub fn bindings(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for predicate in &self.wheres {
            predicate.collect_bindings(&mut out);
        }
        out
    }

    /// Replace the bound values in placeholder order.
    ///
    /// The compiled SQL is unchanged, so exactly one value per placeholder
    /// is required.
    pub fn set_bindings(&mut self, values: Vec<Value>) -> Result<(), ProxyError> {
        let expected = self.bindings().len();
        if values.len() != expected {
            return Err(ProxyError::InvalidArgument {
                method: "set_bindings".to_string(),
                reason: format!("expected {} bindings, got {}", expected, values.len()),
            });
        }
        let mut values = values.into_iter();
        for predicate in &mut self.wheres {
            predicate.rebind(&mut values);
        }
        Ok(())
    }

    /// The compiled `where` clause body, without the keyword.
    pub fn compile_wheres(&self) -> String {
        compile_predicates(&self.wheres)
    }

    /// Compile to SQL text with `?` placeholders.
    pub fn to_sql(&self) -> String {
        let columns = match &self.columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        };

        let mut sql = format!("select {} from {}", columns, quote(&self.table));

        if !self.wheres.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.compile_wheres());
        }

        if !self.orders.is_empty() {
            let orders = self
                .orders
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        Direction::Asc => "asc",
                        Direction::Desc => "desc",
                    };
                    format!("{} {}", quote(&o.column), dir)
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" order by ");
            sql.push_str(&orders);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" offset {}", offset));
        }

        sql
    }

    /// Register a (possibly dotted) eager-load path and return its leaf node.
    ///
    /// Intermediate relations are registered along the way, so `posts.comments`
    /// loads both `posts` and `comments` on each post.
    pub fn eager_load_entry(&mut self, path: &str) -> &mut EagerLoad {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let first = segments.next().unwrap_or(path);
        let mut node = self.eager_loads.entry(first.to_string()).or_default();
        for segment in segments {
            node = node
                .constraint
                .eager_loads
                .entry(segment.to_string())
                .or_default();
        }
        node
    }

    /// Look up a registered eager-load node by dotted path.
    pub fn eager_load(&self, path: &str) -> Option<&EagerLoad> {
        let mut segments = path.split('.');
        let mut node = self.eager_loads.get(segments.next()?)?;
        for segment in segments {
            node = node.constraint.eager_loads.get(segment)?;
        }
        Some(node)
    }

    /// All registered eager-load paths, depth first, sorted per level.
    pub fn eager_load_paths(&self) -> Vec<String> {
        fn walk(prefix: &str, loads: &BTreeMap<String, EagerLoad>, out: &mut Vec<String>) {
            for (name, node) in loads {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                out.push(path.clone());
                walk(&path, &node.constraint.eager_loads, out);
            }
        }
        let mut out = Vec::new();
        walk("", &self.eager_loads, &mut out);
        out
    }
}
