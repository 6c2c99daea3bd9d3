//! SQLite-backed `Store`.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::{Number, Value};

use shopfloor_recon::{ColumnSpec, Filter, Row, Store, StoreError, TableState};

/// Upper bound on `IN (...)` parameters per statement.
const IN_CHUNK: usize = 500;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(store_error)?;
        conn.busy_timeout(busy_timeout).map_err(store_error)?;
        log::debug!("opened store {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(store_error)?;
        Ok(Self { conn })
    }

    /// User tables, sorted by name.
    pub fn tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .map_err(store_error)?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(names)
    }

    pub fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(store_error)
    }

    pub fn count(&self, table: &str) -> Result<u64, StoreError> {
        self.require_table(table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        self.conn
            .query_row(&sql, [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(store_error)
    }

    fn require_table(&self, table: &str) -> Result<(), StoreError> {
        if self.has_table(table)? {
            Ok(())
        } else {
            Err(StoreError::NoSuchTable(table.to_string()))
        }
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let sql = format!("PRAGMA table_info({})", quote(table));
        let mut stmt = self.conn.prepare(&sql).map_err(store_error)?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(1))
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(names)
    }

    /// Raw tables grow with their imports: unknown columns are added untyped.
    fn add_missing_columns(&self, table: &str, rows: &[Row]) -> Result<Vec<String>, StoreError> {
        let mut known = self.columns(table)?;
        for row in rows {
            for col in row.keys() {
                if !known.iter().any(|k| k == col) {
                    let sql = format!("ALTER TABLE {} ADD COLUMN {}", quote(table), quote(col));
                    self.conn.execute(&sql, []).map_err(store_error)?;
                    log::debug!("added column {col} to {table}");
                    known.push(col.clone());
                }
            }
        }
        Ok(known)
    }

    fn select(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(store_error)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params)).map_err(store_error)?;
        let mut out = Vec::new();
        while let Some(r) = rows.next().map_err(store_error)? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = r.get_ref(i).map_err(store_error)?;
                row.insert(name.clone(), from_sql(value));
            }
            out.push(row);
        }
        Ok(out)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        if row.is_empty() {
            return Err(StoreError::InvalidRow(format!("empty row for {table}")));
        }
        let cols: Vec<String> = row.keys().map(|c| quote(c)).collect();
        let marks = vec!["?"; cols.len()].join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES ({marks})", quote(table), cols.join(", "));
        self.conn
            .execute(&sql, params_from_iter(row.values().map(to_sql)))
            .map_err(store_error)?;
        Ok(())
    }

    fn delete_scope(&self, table: &str, scope: &Filter, columns: &[String]) -> Result<(), StoreError> {
        for (clause, params) in where_clauses(scope, columns) {
            let sql = format!("DELETE FROM {}{clause}", quote(table));
            self.conn.execute(&sql, params_from_iter(params)).map_err(store_error)?;
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.require_table(table)?;
        let columns = self.columns(table)?;
        let mut out = Vec::new();
        for (clause, params) in where_clauses(filter, &columns) {
            let sql = format!("SELECT * FROM {}{clause} ORDER BY rowid", quote(table));
            out.extend(self.select(&sql, params)?);
        }
        Ok(out)
    }

    fn upsert(&self, table: &str, rows: &[Row], conflict_key: &[&str]) -> Result<usize, StoreError> {
        self.require_table(table)?;
        for row in rows {
            if let Some(missing) = conflict_key.iter().find(|k| !row.contains_key(**k)) {
                return Err(StoreError::InvalidRow(format!("row lacks conflict key column '{missing}'")));
            }
        }

        let tx = self.conn.unchecked_transaction().map_err(store_error)?;
        self.add_missing_columns(table, rows)?;

        let key_clause = conflict_key
            .iter()
            .map(|k| format!("{} IS ?", quote(k)))
            .collect::<Vec<_>>()
            .join(" AND ");

        for row in rows {
            let key_params: Vec<SqlValue> = conflict_key.iter().map(|k| to_sql(&row[*k])).collect();
            let updates: Vec<(&String, &Value)> =
                row.iter().filter(|(c, _)| !conflict_key.contains(&c.as_str())).collect();

            let exists = if updates.is_empty() {
                let sql = format!("SELECT 1 FROM {} WHERE {key_clause} LIMIT 1", quote(table));
                self.conn
                    .query_row(&sql, params_from_iter(key_params), |_| Ok(()))
                    .optional()
                    .map_err(store_error)?
                    .is_some()
            } else {
                let set = updates
                    .iter()
                    .map(|(c, _)| format!("{} = ?", quote(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("UPDATE {} SET {set} WHERE {key_clause}", quote(table));
                let params = updates.iter().map(|(_, v)| to_sql(v)).chain(key_params);
                self.conn.execute(&sql, params_from_iter(params)).map_err(store_error)? > 0
            };

            if !exists {
                self.insert(table, row)?;
            }
        }

        tx.commit().map_err(store_error)?;
        Ok(rows.len())
    }

    fn replace(&self, table: &str, rows: &[Row], scope: &Filter) -> Result<usize, StoreError> {
        self.require_table(table)?;
        let tx = self.conn.unchecked_transaction().map_err(store_error)?;
        let columns = self.add_missing_columns(table, rows)?;
        self.delete_scope(table, scope, &columns)?;
        for row in rows {
            self.insert(table, row)?;
        }
        tx.commit().map_err(store_error)?;
        Ok(rows.len())
    }

    fn ensure_table(&self, name: &str, columns: &[ColumnSpec]) -> Result<TableState, StoreError> {
        if self.has_table(name)? {
            return Ok(TableState::AlreadyExists);
        }
        if columns.is_empty() {
            return Err(StoreError::InvalidRow(format!("table {name} needs at least one column")));
        }

        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.ty.sql_name()))
            .collect();
        let keys: Vec<String> = columns.iter().filter(|c| c.key).map(|c| quote(&c.name)).collect();
        if !keys.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        let sql = format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(name), defs.join(", "));
        self.conn.execute(&sql, []).map_err(store_error)?;
        Ok(TableState::Created)
    }
}

// ---------------------------------------------------------------------------
// SQL helpers
// ---------------------------------------------------------------------------

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// WHERE clauses for `filter`, one per statement to run. `In` lists are
/// split into chunks; an empty `In` yields no statement at all. A column the
/// table lacks reads as NULL.
fn where_clauses(filter: &Filter, columns: &[String]) -> Vec<(String, Vec<SqlValue>)> {
    let has = |col: &str| columns.iter().any(|c| c == col);
    match filter {
        Filter::All => vec![(String::new(), Vec::new())],
        Filter::Eq(col, v) if !has(col) => {
            if v.is_null() {
                vec![(String::new(), Vec::new())]
            } else {
                Vec::new()
            }
        }
        Filter::Eq(col, v) => vec![(format!(" WHERE {} IS ?", quote(col)), vec![to_sql(v)])],
        Filter::In(col, vs) if !has(col) => {
            if vs.iter().any(Value::is_null) {
                vec![(String::new(), Vec::new())]
            } else {
                Vec::new()
            }
        }
        Filter::In(col, vs) => vs
            .chunks(IN_CHUNK)
            .map(|chunk| {
                let marks = vec!["?"; chunk.len()].join(", ");
                let clause = format!(" WHERE {} IN ({marks})", quote(col));
                (clause, chunk.iter().map(to_sql).collect())
            })
            .collect(),
    }
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn store_error(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StoreError::Timeout(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}
