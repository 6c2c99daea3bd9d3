//! Store client contract consumed by the engine.
//!
//! The engine never talks to a database directly. Every component receives a
//! `&dyn Store` at construction; `MemoryStore` (in-memory) and the SQLite
//! store in `shopfloor-io` both implement it.

use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

/// One row: column name → value.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("no such table: {0}")]
    NoSuchTable(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("{0}")]
    Backend(String),
}

/// Row selection for `query` and the delete half of `replace`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn any_of<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// Evaluate against an in-memory row. A missing column reads as `null`.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::Eq(col, v) => row.get(col).unwrap_or(&Value::Null) == v,
            Self::In(col, vs) => {
                let cell = row.get(col).unwrap_or(&Value::Null);
                vs.iter().any(|v| v == cell)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// Column of a provisioned table. Derived tables use static names; raw
/// tables take theirs from import headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: Cow<'static, str>,
    pub ty: ColumnType,
    /// Part of the table's natural key.
    pub key: bool,
}

impl ColumnSpec {
    pub const fn key(name: &'static str, ty: ColumnType) -> Self {
        Self { name: Cow::Borrowed(name), ty, key: true }
    }

    pub const fn col(name: &'static str, ty: ColumnType) -> Self {
        Self { name: Cow::Borrowed(name), ty, key: false }
    }

    pub fn dynamic(name: impl Into<String>, ty: ColumnType, key: bool) -> Self {
        Self { name: Cow::Owned(name.into()), ty, key }
    }
}

/// Outcome of `ensure_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Created,
    AlreadyExists,
}

pub trait Store {
    /// Rows of `table` matching `filter`, in store order.
    fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Update rows whose `conflict_key` columns equal the incoming row's, insert
    /// the rest. Columns absent from an incoming row are left untouched.
    /// Returns the number of rows written.
    fn upsert(&self, table: &str, rows: &[Row], conflict_key: &[&str]) -> Result<usize, StoreError>;

    /// Delete every row matching `scope`, then insert `rows`. Returns rows inserted.
    fn replace(&self, table: &str, rows: &[Row], scope: &Filter) -> Result<usize, StoreError>;

    /// Create `name` with `columns` unless it already exists.
    fn ensure_table(&self, name: &str, columns: &[ColumnSpec]) -> Result<TableState, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn filter_eq_and_in() {
        let r = row(json!({"job_number": "100575126", "vendor": "SR"}));
        assert!(Filter::All.matches(&r));
        assert!(Filter::eq("job_number", "100575126").matches(&r));
        assert!(!Filter::eq("job_number", "1").matches(&r));
        assert!(Filter::any_of("vendor", ["DNI", "SR"]).matches(&r));
        assert!(!Filter::any_of("vendor", Vec::<String>::new()).matches(&r));
    }

    #[test]
    fn filter_missing_column_is_null() {
        let r = row(json!({"a": 1}));
        assert!(Filter::Eq("b".into(), Value::Null).matches(&r));
        assert!(!Filter::eq("b", "x").matches(&r));
    }
}
