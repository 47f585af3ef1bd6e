//! Scalar values, records and terminal call results.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// SCALAR VALUES
// ============================================================================

/// A typed scalar, used both for bound parameters and for record attributes.
///
/// Serialization is externally tagged so that `Int(1)` and `Text("1")`
/// never encode the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Compare two values the way a database would for ordering and range predicates.
    ///
    /// Integers and floats compare numerically. Null and mismatched types
    /// are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Check for SQL-style equality (null never equals anything).
    pub fn sql_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

/// Values beyond `i64::MAX` become their exact decimal text, the way
/// databases hand back unsigned 64-bit columns.
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(v.to_string()))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// A single row, plus any eagerly loaded relations hydrated onto it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Vec<Record>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute (builder style).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Read an attribute, treating a missing column as null.
    pub fn value(&self, column: &str) -> Value {
        self.attributes.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column.into(), value.into());
    }

    /// The primary key, by convention the `id` column.
    pub fn key(&self) -> Option<i64> {
        self.get("id").and_then(Value::as_i64)
    }

    pub fn relation(&self, name: &str) -> Option<&[Record]> {
        self.relations.get(name).map(Vec::as_slice)
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Keep only the listed attributes. `*` keeps everything.
    pub fn project(mut self, columns: &[String]) -> Self {
        if columns.iter().any(|c| c == "*") {
            return self;
        }
        self.attributes.retain(|column, _| columns.iter().any(|c| c == column));
        self
    }
}

// ============================================================================
// PAGES
// ============================================================================

/// One page of a paginated retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

impl Page {
    /// One-based position of the first item on this page, if any.
    pub fn first_item(&self) -> Option<u64> {
        if self.items.is_empty() {
            None
        } else {
            Some(
                self.current_page
                    .saturating_sub(1)
                    .saturating_mul(self.per_page)
                    .saturating_add(1),
            )
        }
    }

    /// One-based position of the last item on this page, if any.
    pub fn last_item(&self) -> Option<u64> {
        self.first_item()
            .map(|first| first.saturating_add(self.items.len() as u64 - 1))
    }

    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }
}

// ============================================================================
// TERMINAL RESULTS
// ============================================================================

/// What a terminal call yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    /// Single-record retrieval; `None` when nothing matched.
    Record(Option<Record>),
    /// Collection retrieval.
    Rows(Vec<Record>),
    /// Paginated retrieval.
    Page(Page),
    /// Aggregate value (count, exists, sum, ...).
    Scalar(Value),
    /// Rows affected by a write.
    Affected(u64),
}

/// The shape of a [`QueryResult`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultShape {
    Record,
    Rows,
    Page,
    Scalar,
    Affected,
}

impl ResultShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultShape::Record => "record",
            ResultShape::Rows => "rows",
            ResultShape::Page => "page",
            ResultShape::Scalar => "scalar",
            ResultShape::Affected => "affected",
        }
    }
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueryResult {
    pub fn shape(&self) -> ResultShape {
        match self {
            QueryResult::Record(_) => ResultShape::Record,
            QueryResult::Rows(_) => ResultShape::Rows,
            QueryResult::Page(_) => ResultShape::Page,
            QueryResult::Scalar(_) => ResultShape::Scalar,
            QueryResult::Affected(_) => ResultShape::Affected,
        }
    }

    /// True for "no record" and for an empty collection.
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryResult::Record(None))
            || matches!(self, QueryResult::Rows(rows) if rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compare_numeric_across_types() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(Value::Int(1).compare(&Value::Int(3)), Some(Ordering::Less));
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Text("1".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_value_serialization_is_typed() {
        let int = serde_json::to_string(&Value::Int(1)).unwrap();
        let text = serde_json::to_string(&Value::Text("1".into())).unwrap();
        assert_ne!(int, text);
    }

    #[test]
    fn test_record_projection() {
        let record = Record::new().with("id", 1).with("name", "ada").with("email", "a@b.c");

        let projected = record.clone().project(&["name".to_string()]);
        assert_eq!(projected.attributes.len(), 1);
        assert_eq!(projected.value("name"), Value::from("ada"));

        let all = record.clone().project(&["*".to_string()]);
        assert_eq!(all, record);
    }

    #[test]
    fn test_page_first_item() {
        let page = Page {
            items: vec![Record::new().with("id", 2)],
            total: 10,
            per_page: 1,
            current_page: 2,
        };
        assert_eq!(page.first_item(), Some(2));
        assert_eq!(page.last_item(), Some(2));
        assert_eq!(page.last_page(), 10);
        assert!(page.has_more_pages());

        let empty = Page {
            items: vec![],
            total: 0,
            per_page: 15,
            current_page: 1,
        };
        assert_eq!(empty.first_item(), None);
        assert_eq!(empty.last_page(), 1);
    }

    #[test]
    fn test_page_positions_saturate() {
        let page_zero = Page {
            items: vec![Record::new().with("id", 1)],
            total: 1,
            per_page: 15,
            current_page: 0,
        };
        assert_eq!(page_zero.first_item(), Some(1));
        assert_eq!(page_zero.last_item(), Some(1));

        let far = Page {
            items: vec![Record::new(), Record::new()],
            total: u64::MAX,
            per_page: u64::MAX,
            current_page: u64::MAX,
        };
        assert_eq!(far.first_item(), Some(u64::MAX));
        assert_eq!(far.last_item(), Some(u64::MAX));
    }

    #[test]
    fn test_large_unsigned_values_stay_exact() {
        assert_eq!(Value::from(42u64), Value::Int(42));
        assert_eq!(Value::from(i64::MAX as u64), Value::Int(i64::MAX));
        assert_eq!(
            Value::from(u64::MAX),
            Value::Text("18446744073709551615".to_string())
        );
    }

    #[test]
    fn test_result_is_empty() {
        assert!(QueryResult::Record(None).is_empty());
        assert!(QueryResult::Rows(vec![]).is_empty());
        assert!(!QueryResult::Scalar(Value::Int(0)).is_empty());
        assert!(!QueryResult::Affected(0).is_empty());
    }
}
