//! PostgREST request model
//!
//! A [`TableRequest`] describes exactly one round trip against a table. It
//! carries no connection state, so it can be built, inspected and compared
//! without touching the network.

use crewbase_core::{FilterSet, Record};
use serde_json::Value;

/// Kind of table operation, mapped onto an HTTP verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOperation {
    /// `GET`
    Select,
    /// `POST`
    Insert,
    /// `PATCH`
    Update,
    /// `DELETE`
    Delete,
}

impl TableOperation {
    /// Name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            TableOperation::Select => "query",
            TableOperation::Insert => "insert",
            TableOperation::Update => "update",
            TableOperation::Delete => "delete",
        }
    }

    /// True for operations that change rows
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TableOperation::Select)
    }
}

impl std::fmt::Display for TableOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`; a JSON `null` renders `IS NULL`
    Eq(String, Value),
    /// `column <> value`
    Neq(String, Value),
    /// `column LIKE pattern` (`*` is the wildcard)
    Like(String, String),
}

impl Filter {
    /// Render as a `(column, "op.value")` query pair
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(column, Value::Null) => (column.clone(), "is.null".to_string()),
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", render_value(value))),
            Filter::Neq(column, value) => {
                (column.clone(), format!("neq.{}", render_value(value)))
            }
            Filter::Like(column, pattern) => (column.clone(), format!("like.{}", pattern)),
        }
    }
}

/// Render a JSON value the way PostgREST expects it in a filter
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// One request against a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    /// Operation to perform
    pub operation: TableOperation,
    /// Target table name
    pub table: String,
    /// Column list for selects
    pub columns: String,
    /// Conjunctive predicates
    pub filters: Vec<Filter>,
    /// JSON body for insert/update
    pub body: Option<Value>,
    /// Row limit for selects
    pub limit: Option<usize>,
}

impl TableRequest {
    fn new(operation: TableOperation, table: impl Into<String>) -> Self {
        Self {
            operation,
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            body: None,
            limit: None,
        }
    }

    /// `SELECT * FROM table`
    pub fn select(table: impl Into<String>) -> Self {
        Self::new(TableOperation::Select, table)
    }

    /// `INSERT INTO table` with one record
    pub fn insert(table: impl Into<String>, record: Record) -> Self {
        let mut request = Self::new(TableOperation::Insert, table);
        request.body = Some(Value::Object(record));
        request
    }

    /// `UPDATE table SET record`
    pub fn update(table: impl Into<String>, record: Record) -> Self {
        let mut request = Self::new(TableOperation::Update, table);
        request.body = Some(Value::Object(record));
        request
    }

    /// `DELETE FROM table`
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(TableOperation::Delete, table)
    }

    /// Restrict selected columns
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Add an equality predicate
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.into(), value.into()));
        self
    }

    /// Add an inequality predicate
    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.into(), value.into()));
        self
    }

    /// Add a LIKE predicate
    pub fn like(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters.push(Filter::Like(column.into(), pattern.into()));
        self
    }

    /// Apply every entry of `filters` as an equality predicate
    pub fn matching(mut self, filters: &FilterSet) -> Self {
        for (column, value) in filters {
            self.filters.push(Filter::Eq(column.clone(), value.clone()));
        }
        self
    }

    /// Cap the number of returned rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs, in request order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 2);
        if self.operation == TableOperation::Select {
            pairs.push(("select".to_string(), self.columns.clone()));
        }
        pairs.extend(self.filters.iter().map(Filter::to_query_pair));
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Human-readable query string, unencoded (for logs and tests)
    pub fn query_string(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}
