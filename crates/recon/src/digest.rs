use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ReconError;
use crate::schema::DERIVED_TABLES;
use crate::store::{Filter, Store};

/// SHA-256 over every derived table → "sha256:<64 hex>".
///
/// Each table contributes its name followed by its rows as compact JSON
/// (keys sorted), one per line, sorted. Store order does not affect the result.
pub fn derived_digest(store: &dyn Store) -> Result<String, ReconError> {
    let mut hasher = Sha256::new();
    for (table, _) in DERIVED_TABLES {
        let rows = store
            .query(table, &Filter::All)
            .map_err(|e| ReconError::query(table, e))?;
        let mut lines: Vec<String> = rows
            .iter()
            .map(|row| {
                let sorted: BTreeMap<&String, &Value> = row.iter().collect();
                serde_json::to_string(&sorted).unwrap_or_default()
            })
            .collect();
        lines.sort();

        hasher.update(table.as_bytes());
        hasher.update(b"\n");
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}
