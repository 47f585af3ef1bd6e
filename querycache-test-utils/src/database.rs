//! In-memory relational executor.
//!
//! Tables are vectors of [`Record`]s. Relations are declared per parent table
//! and resolved through the [`RelationLoader`] the caller supplies, so cached
//! eager loads can be observed end to end.

use querycache_core::{
    Aggregate, Boolean, ExecutorError, Operator, Page, Predicate, QueryCacheResult,
    QueryDefinition, QueryResult, Record, Retrieval, Value, Write,
};
use querycache_proxy::{QueryExecutor, RelationFetch, RelationLoader};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};
use tracing::trace;

/// How a relation joins a parent table to a related table.
///
/// A related record belongs to a parent when
/// `related[foreign_key] == parent[local_key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
}

/// An executor over in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<BTreeMap<String, Vec<Record>>>,
    relations: RwLock<HashMap<(String, String), RelationDef>>,
    executions: AtomicUsize,
    executed: Mutex<Vec<String>>,
    fail_next: Mutex<Option<ExecutorError>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table (inserting also creates tables).
    pub fn create_table(&self, table: &str) {
        self.tables
            .write()
            .unwrap()
            .entry(table.to_string())
            .or_default();
    }

    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .write()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// `parent.name` loads the `table` rows whose `foreign_key` equals the parent's `id`.
    pub fn has_many(&self, parent: &str, name: &str, table: &str, foreign_key: &str) {
        self.define_relation(
            parent,
            name,
            RelationDef {
                table: table.to_string(),
                local_key: "id".to_string(),
                foreign_key: foreign_key.to_string(),
            },
        );
    }

    /// `parent.name` loads the `table` row whose `id` equals the parent's `local_key`.
    pub fn belongs_to(&self, parent: &str, name: &str, table: &str, local_key: &str) {
        self.define_relation(
            parent,
            name,
            RelationDef {
                table: table.to_string(),
                local_key: local_key.to_string(),
                foreign_key: "id".to_string(),
            },
        );
    }

    pub fn define_relation(&self, parent: &str, name: &str, relation: RelationDef) {
        self.relations
            .write()
            .unwrap()
            .insert((parent.to_string(), name.to_string()), relation);
    }

    /// Delete rows directly, bypassing any cache.
    pub fn delete_where(&self, table: &str, column: &str, value: impl Into<Value>) -> usize {
        let value = value.into();
        let mut tables = self.tables.write().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| !row.value(column).sql_eq(&value));
        before - rows.len()
    }

    /// Current contents of a table.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// The row of `table` with primary key `id`.
    pub fn find(&self, table: &str, id: i64) -> Option<Record> {
        self.rows(table).into_iter().find(|row| row.key() == Some(id))
    }

    /// Number of `execute` calls, relation loads included.
    pub fn executions(&self) -> usize {
        self.executions.load(AtomicOrdering::SeqCst)
    }

    /// Tables queried, in execution order.
    pub fn executed_tables(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn reset_executions(&self) {
        self.executions.store(0, AtomicOrdering::SeqCst);
        self.executed.lock().unwrap().clear();
    }

    /// Make the next `execute` call fail with `error`.
    pub fn fail_next(&self, error: ExecutorError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    fn relation(&self, parent: &str, name: &str) -> QueryCacheResult<RelationDef> {
        self.relations
            .read()
            .unwrap()
            .get(&(parent.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ExecutorError::UnknownRelation {
                    table: parent.to_string(),
                    relation: name.to_string(),
                }
                .into()
            })
    }

    fn select(&self, query: &QueryDefinition) -> QueryCacheResult<Vec<Record>> {
        let tables = self.tables.read().unwrap();
        let rows = tables
            .get(&query.table)
            .ok_or_else(|| ExecutorError::UnknownTable {
                table: query.table.clone(),
            })?;

        let mut matched = Vec::new();
        for row in rows {
            if matches_all(row, &query.wheres, query)? {
                matched.push(row.clone());
            }
        }

        matched.sort_by(|a, b| {
            for order in &query.orders {
                let column = unqualified(&order.column);
                let ordering = a
                    .value(column)
                    .compare(&b.value(column))
                    .unwrap_or(Ordering::Equal);
                let ordering = match order.direction {
                    querycache_core::Direction::Asc => ordering,
                    querycache_core::Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(matched)
    }

    fn write(&self, query: &QueryDefinition, write: &Write) -> QueryCacheResult<u64> {
        let mut tables = self.tables.write().unwrap();
        let rows = tables
            .get_mut(&query.table)
            .ok_or_else(|| ExecutorError::UnknownTable {
                table: query.table.clone(),
            })?;

        let mut affected = 0;
        for row in rows.iter_mut() {
            if !matches_all(row, &query.wheres, query)? {
                continue;
            }
            match write {
                Write::Increment { column, amount } => {
                    let current = row.value(column).as_i64().unwrap_or(0);
                    row.set(column.clone(), current + amount);
                }
                Write::Update { values } => {
                    for (column, value) in values {
                        row.set(column.clone(), value.clone());
                    }
                }
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn eager_load(
        &self,
        query: &QueryDefinition,
        records: &mut [Record],
        relations: &dyn RelationLoader,
    ) -> QueryCacheResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        for (name, node) in &query.eager_loads {
            let relation = self.relation(&query.table, name)?;

            let mut keys: Vec<Value> = Vec::new();
            for record in records.iter() {
                let key = record.value(&relation.local_key);
                if !key.is_null() && !keys.iter().any(|k| k.sql_eq(&key)) {
                    keys.push(key);
                }
            }

            let mut fetch_query =
                node.relation_query(&relation.table, &relation.foreign_key, keys);
            // The join column must survive the constraint's projection.
            if let Some(columns) = fetch_query.columns.as_mut() {
                if !columns.iter().any(|c| c == "*" || c == &relation.foreign_key) {
                    columns.push(relation.foreign_key.clone());
                }
            }

            let related = relations.load(RelationFetch {
                path: name.clone(),
                query: fetch_query,
                directive: node.directive.clone(),
            })?;

            for record in records.iter_mut() {
                let key = record.value(&relation.local_key);
                let children = related
                    .iter()
                    .filter(|child| child.value(&relation.foreign_key).sql_eq(&key))
                    .cloned()
                    .collect();
                record.relations.insert(name.clone(), children);
            }
        }
        Ok(())
    }
}

impl QueryExecutor for MemoryDatabase {
    fn execute(
        &self,
        query: &QueryDefinition,
        retrieval: &Retrieval,
        relations: &dyn RelationLoader,
    ) -> QueryCacheResult<QueryResult> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error.into());
        }
        self.executions.fetch_add(1, AtomicOrdering::SeqCst);
        self.executed.lock().unwrap().push(query.table.clone());
        trace!(table = %query.table, method = retrieval.method(), "Executing query");

        if let Retrieval::Write(write) = retrieval {
            return Ok(QueryResult::Affected(self.write(query, write)?));
        }

        let rows = self.select(query)?;

        if let Retrieval::Aggregate { function, column } = retrieval {
            return Ok(QueryResult::Scalar(aggregate(*function, column.as_deref(), &rows)));
        }

        let shape = retrieval.shape(query, &querycache_core::NoPagination);
        let offset = shape.offset.unwrap_or(0) as usize;

        let (mut records, page) = match shape.page {
            Some((page, per_page)) => {
                let start = (page.saturating_sub(1) * per_page) as usize;
                let items: Vec<Record> = rows
                    .iter()
                    .skip(start)
                    .take(per_page as usize)
                    .cloned()
                    .collect();
                (items, Some((rows.len() as u64, page, per_page)))
            }
            None => {
                let limit = shape.limit.map(|l| l as usize).unwrap_or(usize::MAX);
                let items = rows.into_iter().skip(offset).take(limit).collect();
                (items, None)
            }
        };

        self.eager_load(query, &mut records, relations)?;

        if let Some(columns) = &shape.columns {
            records = records
                .into_iter()
                .map(|record| record.project(columns))
                .collect();
        }

        Ok(match (retrieval, page) {
            (Retrieval::First { .. }, _) => QueryResult::Record(records.into_iter().next()),
            (_, Some((total, current_page, per_page))) => QueryResult::Page(Page {
                items: records,
                total,
                per_page,
                current_page,
            }),
            _ => QueryResult::Rows(records),
        })
    }
}

// ============================================================================
// PREDICATE EVALUATION
// ============================================================================

/// `and` binds tighter than `or`: the list is split into `or`-separated
/// groups, each of which must match entirely.
fn matches_all(row: &Record, predicates: &[Predicate], query: &QueryDefinition) -> QueryCacheResult<bool> {
    let mut any_group = false;
    let mut group = true;
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 && predicate.boolean() == Boolean::Or {
            any_group |= group;
            group = true;
        }
        group = group && matches(row, predicate, query)?;
    }
    Ok(predicates.is_empty() || any_group || group)
}

fn matches(row: &Record, predicate: &Predicate, query: &QueryDefinition) -> QueryCacheResult<bool> {
    Ok(match predicate {
        Predicate::Compare {
            column,
            operator,
            value,
            ..
        } => compare(&row.value(unqualified(column)), *operator, value),
        Predicate::In {
            column,
            values,
            negated,
            ..
        } => {
            let actual = row.value(unqualified(column));
            if actual.is_null() {
                false
            } else {
                values.iter().any(|v| actual.sql_eq(v)) != *negated
            }
        }
        Predicate::Null {
            column, negated, ..
        } => row.value(unqualified(column)).is_null() != *negated,
        Predicate::Group { predicates, .. } => matches_all(row, predicates, query)?,
        Predicate::Raw { sql, .. } => {
            return Err(ExecutorError::Unsupported {
                reason: format!("raw predicate `{}` on {}", sql, query.table),
            }
            .into())
        }
    })
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    if operator == Operator::Like {
        return match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        };
    }
    let Some(ordering) = actual.compare(expected) else {
        return false;
    };
    match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::NotEq => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Like => false,
    }
}

/// Case-insensitive `like` with `%` wildcards.
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let mut rest = text.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn unqualified(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn aggregate(function: Aggregate, column: Option<&str>, rows: &[Record]) -> Value {
    let values = || {
        rows.iter()
            .map(move |row| row.value(column.map(unqualified).unwrap_or("id")))
            .filter(|v| !v.is_null())
    };

    match function {
        Aggregate::Count => Value::Int(rows.len() as i64),
        Aggregate::Exists => Value::Bool(!rows.is_empty()),
        Aggregate::Sum => {
            let mut int_total: i64 = 0;
            let mut float_total: f64 = 0.0;
            let mut is_float = false;
            for value in values() {
                match value {
                    Value::Int(i) => int_total += i,
                    Value::Float(f) => {
                        is_float = true;
                        float_total += f;
                    }
                    _ => {}
                }
            }
            if is_float {
                Value::Float(float_total + int_total as f64)
            } else {
                Value::Int(int_total)
            }
        }
        Aggregate::Max => values()
            .reduce(|a, b| if b.compare(&a) == Some(Ordering::Greater) { b } else { a })
            .unwrap_or(Value::Null),
        Aggregate::Min => values()
            .reduce(|a, b| if b.compare(&a) == Some(Ordering::Less) { b } else { a })
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like() {
        assert!(like("Ada Lovelace", "ada%"));
        assert!(like("Ada Lovelace", "%lace"));
        assert!(like("Ada Lovelace", "%love%"));
        assert!(like("ada", "ada"));
        assert!(!like("Ada", "bob%"));
        assert!(!like("Ada Lovelace", "%grace%"));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let row = Record::new().with("a", 1).with("b", 2);
        let eq = |column: &str, value: i64, boolean| Predicate::Compare {
            column: column.to_string(),
            operator: Operator::Eq,
            value: Value::Int(value),
            boolean,
        };
        let query = QueryDefinition::new("t");

        // a = 9 or a = 1 and b = 2
        let predicates = vec![
            eq("a", 9, Boolean::And),
            eq("a", 1, Boolean::Or),
            eq("b", 2, Boolean::And),
        ];
        assert!(matches_all(&row, &predicates, &query).unwrap());

        // a = 1 and b = 9 or a = 9
        let predicates = vec![
            eq("a", 1, Boolean::And),
            eq("b", 9, Boolean::And),
            eq("a", 9, Boolean::Or),
        ];
        assert!(!matches_all(&row, &predicates, &query).unwrap());
    }

    #[test]
    fn test_aggregates() {
        let rows = vec![
            Record::new().with("likes", 3),
            Record::new().with("likes", 5),
            Record::new(),
        ];
        assert_eq!(aggregate(Aggregate::Count, None, &rows), Value::Int(3));
        assert_eq!(aggregate(Aggregate::Sum, Some("likes"), &rows), Value::Int(8));
        assert_eq!(aggregate(Aggregate::Max, Some("likes"), &rows), Value::Int(5));
        assert_eq!(aggregate(Aggregate::Min, Some("likes"), &rows), Value::Int(3));
        assert_eq!(aggregate(Aggregate::Max, Some("likes"), &[]), Value::Null);
        assert_eq!(aggregate(Aggregate::Exists, None, &[]), Value::Bool(false));
    }
}
