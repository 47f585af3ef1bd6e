//! Terminal calls and their retrieval shape.
//!
//! The fingerprint depends on what a terminal call asks for (columns, limit,
//! page, aggregate, write), never on the name of the method that asked.

use crate::definition::QueryDefinition;
use crate::pagination::PaginationContext;
use crate::value::{ResultShape, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregate {
    Count,
    Exists,
    Sum,
    Max,
    Min,
}

/// Writes that may be issued through the decorator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Write {
    Increment { column: String, amount: i64 },
    Update { values: BTreeMap<String, Value> },
}

/// A terminal call, with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Retrieval {
    First {
        columns: Option<Vec<String>>,
    },
    Get {
        columns: Option<Vec<String>>,
    },
    Paginate {
        per_page: u64,
        /// `None` resolves through the pagination context.
        page: Option<u64>,
        columns: Option<Vec<String>>,
        page_name: String,
    },
    Aggregate {
        function: Aggregate,
        column: Option<String>,
    },
    Write(Write),
}

/// The part of a terminal call that changes which data comes back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalShape {
    /// Effective projection. `None` when neither the builder nor the call chose columns.
    pub columns: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `(page, per_page)` when paginating.
    pub page: Option<(u64, u64)>,
    pub aggregate: Option<(Aggregate, Option<String>)>,
    pub write: Option<Write>,
}

impl Retrieval {
    pub fn first() -> Self {
        Retrieval::First { columns: None }
    }

    pub fn get() -> Self {
        Retrieval::Get { columns: None }
    }

    /// Name of the method this retrieval corresponds to, used for call
    /// classification and logging.
    pub fn method(&self) -> &'static str {
        match self {
            Retrieval::First { .. } => "first",
            Retrieval::Get { .. } => "get",
            Retrieval::Paginate { .. } => "paginate",
            Retrieval::Aggregate { function, .. } => match function {
                Aggregate::Count => "count",
                Aggregate::Exists => "exists",
                Aggregate::Sum => "sum",
                Aggregate::Max => "max",
                Aggregate::Min => "min",
            },
            Retrieval::Write(Write::Increment { amount, .. }) if *amount < 0 => "decrement",
            Retrieval::Write(Write::Increment { .. }) => "increment",
            Retrieval::Write(Write::Update { .. }) => "update",
        }
    }

    /// The shape of the result this retrieval yields.
    pub fn result_shape(&self) -> ResultShape {
        match self {
            Retrieval::First { .. } => ResultShape::Record,
            Retrieval::Get { .. } => ResultShape::Rows,
            Retrieval::Paginate { .. } => ResultShape::Page,
            Retrieval::Aggregate { .. } => ResultShape::Scalar,
            Retrieval::Write(_) => ResultShape::Affected,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Retrieval::Write(_))
    }

    /// Resolve the page of a pagination call without an explicit page.
    ///
    /// Falls back to the context's current page, then to page 1. Pages below
    /// 1 are clamped to 1.
    pub fn resolve(self, context: &dyn PaginationContext) -> Self {
        match self {
            Retrieval::Paginate {
                per_page,
                page,
                columns,
                page_name,
            } => {
                let page = page
                    .or_else(|| context.current_page(&page_name))
                    .unwrap_or(1)
                    .max(1);
                Retrieval::Paginate {
                    per_page,
                    page: Some(page),
                    columns,
                    page_name,
                }
            }
            other => other,
        }
    }

    /// Compute the retrieval shape against a query definition.
    ///
    /// The builder's explicit projection wins over columns passed to the
    /// terminal call. `first` is shaped as `limit 1`, so it shares a shape with
    /// `limit(1).get()`.
    pub fn shape(&self, query: &QueryDefinition, context: &dyn PaginationContext) -> RetrievalShape {
        let columns_for = |columns: &Option<Vec<String>>| query.columns.clone().or_else(|| columns.clone());

        let mut shape = RetrievalShape {
            columns: query.columns.clone(),
            limit: query.limit,
            offset: query.offset,
            page: None,
            aggregate: None,
            write: None,
        };

        match self.clone().resolve(context) {
            Retrieval::First { columns } => {
                shape.columns = columns_for(&columns);
                shape.limit = Some(1);
            }
            Retrieval::Get { columns } => {
                shape.columns = columns_for(&columns);
            }
            Retrieval::Paginate {
                per_page,
                page,
                columns,
                ..
            } => {
                shape.columns = columns_for(&columns);
                shape.page = Some((page.unwrap_or(1), per_page));
            }
            Retrieval::Aggregate { function, column } => {
                shape.aggregate = Some((function, column));
            }
            Retrieval::Write(write) => {
                shape.write = Some(write);
            }
        }

        shape
    }
}
