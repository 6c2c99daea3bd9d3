//! In-memory `Store`. Used by tests and by dry runs.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use crate::store::{ColumnSpec, Filter, Row, Store, StoreError, TableState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    Query,
    Upsert,
    Replace,
    EnsureTable,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, Table>,
    failures: BTreeSet<(StoreOp, String)>,
}

/// A single-lock table map. Every operation runs under the lock, so `replace`
/// is atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `table`, creating it if needed. Stands in for the import layer.
    pub fn load_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut inner = self.inner.lock();
        inner.tables.entry(table.to_string()).or_default().rows.extend(rows);
    }

    /// All rows of `table`, or an empty vec if it does not exist.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let inner = self.inner.lock();
        inner.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.inner.lock().tables.contains_key(table)
    }

    /// Make every `op` on `table` fail with a backend error until cleared.
    pub fn fail_on(&self, op: StoreOp, table: &str) {
        self.inner.lock().failures.insert((op, table.to_string()));
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    fn check(inner: &Inner, op: StoreOp, table: &str) -> Result<(), StoreError> {
        if inner.failures.contains(&(op, table.to_string())) {
            return Err(StoreError::Backend(format!("injected {op:?} failure on {table}")));
        }
        Ok(())
    }
}

fn same_key(existing: &Row, incoming: &Row, key: &[&str]) -> bool {
    key.iter().all(|k| existing.get(*k) == incoming.get(*k))
}

impl Store for MemoryStore {
    fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let inner = self.inner.lock();
        Self::check(&inner, StoreOp::Query, table)?;
        let t = inner
            .tables
            .get(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;
        Ok(t.rows.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn upsert(&self, table: &str, rows: &[Row], conflict_key: &[&str]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        Self::check(&inner, StoreOp::Upsert, table)?;
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;

        for incoming in rows {
            if let Some(missing) = conflict_key.iter().find(|k| !incoming.contains_key(**k)) {
                return Err(StoreError::InvalidRow(format!("row lacks conflict key column '{missing}'")));
            }
            match t.rows.iter_mut().find(|r| same_key(r, incoming, conflict_key)) {
                Some(existing) => {
                    for (col, val) in incoming {
                        existing.insert(col.clone(), val.clone());
                    }
                }
                None => t.rows.push(incoming.clone()),
            }
        }
        Ok(rows.len())
    }

    fn replace(&self, table: &str, rows: &[Row], scope: &Filter) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        Self::check(&inner, StoreOp::Replace, table)?;
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;
        t.rows.retain(|r| !scope.matches(r));
        t.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn ensure_table(&self, name: &str, _columns: &[ColumnSpec]) -> Result<TableState, StoreError> {
        let mut inner = self.inner.lock();
        Self::check(&inner, StoreOp::EnsureTable, name)?;
        if inner.tables.contains_key(name) {
            return Ok(TableState::AlreadyExists);
        }
        inner.tables.insert(name.to_string(), Table::default());
        Ok(TableState::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.ensure_table("t", &[]).unwrap(), TableState::Created);
        assert_eq!(store.ensure_table("t", &[]).unwrap(), TableState::AlreadyExists);
    }

    #[test]
    fn upsert_merges_by_key() {
        let store = MemoryStore::new();
        store.load_rows("po", [row(json!({"doc": "45001", "vendor": "Acme", "job_number": null}))]);
        store
            .upsert("po", &[row(json!({"doc": "45001", "job_number": "100575126"}))], &["doc"])
            .unwrap();
        store
            .upsert("po", &[row(json!({"doc": "45002", "job_number": "1"}))], &["doc"])
            .unwrap();

        let rows = store.rows("po");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["vendor"], "Acme");
        assert_eq!(rows[0]["job_number"], "100575126");
    }

    #[test]
    fn upsert_requires_key_columns() {
        let store = MemoryStore::new();
        store.ensure_table("po", &[]).unwrap();
        let err = store.upsert("po", &[row(json!({"vendor": "Acme"}))], &["doc"]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow(_)));
    }

    #[test]
    fn replace_only_touches_scope() {
        let store = MemoryStore::new();
        store.load_rows(
            "ops",
            [
                row(json!({"job": "A", "op": "10"})),
                row(json!({"job": "B", "op": "10"})),
            ],
        );
        store
            .replace("ops", &[row(json!({"job": "A", "op": "20"}))], &Filter::eq("job", "A"))
            .unwrap();
        let rows = store.rows("ops");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["job"], "B");
        assert_eq!(rows[1]["op"], "20");
    }

    #[test]
    fn missing_table_and_injected_failures() {
        let store = MemoryStore::new();
        assert!(matches!(store.query("nope", &Filter::All), Err(StoreError::NoSuchTable(_))));

        store.ensure_table("t", &[]).unwrap();
        store.fail_on(StoreOp::Query, "t");
        assert!(matches!(store.query("t", &Filter::All), Err(StoreError::Backend(_))));
        store.clear_failures();
        assert!(store.query("t", &Filter::All).unwrap().is_empty());
    }
}
