//! Table names, derived-table schemas and the schema provisioner.

use serde::Serialize;

use crate::error::ReconError;
use crate::store::ColumnType::{Integer, Real, Text};
use crate::store::{ColumnSpec, Store, TableState};

pub const JOBS: &str = "jobs";
pub const SAP_OPERATIONS: &str = "sap_operations";
pub const PURCHASE_ORDERS: &str = "purchase_orders";
pub const SHIPMENT_LOGS: &str = "shipment_logs";

pub const VENDOR_OPERATIONS: &str = "vendor_operations";
pub const WORK_CENTERS: &str = "work_centers";
pub const JOB_TIMELINE: &str = "job_timeline";

pub const VENDOR_OPERATIONS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::key("job_number", Text),
    ColumnSpec::key("operation_number", Text),
    ColumnSpec::key("vendor", Text),
    ColumnSpec::col("vendor_name", Text),
    ColumnSpec::col("description", Text),
    ColumnSpec::col("start_date", Text),
    ColumnSpec::col("end_date", Text),
    ColumnSpec::col("status", Text),
    ColumnSpec::col("notes", Text),
];

pub const WORK_CENTERS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::key("name", Text),
    ColumnSpec::col("kind", Text),
    ColumnSpec::col("status", Text),
    ColumnSpec::col("operation_count", Integer),
    ColumnSpec::col("active_count", Integer),
    ColumnSpec::col("utilization", Real),
];

pub const JOB_TIMELINE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::key("job_number", Text),
    ColumnSpec::key("event_date", Text),
    ColumnSpec::key("source", Text),
    ColumnSpec::key("source_id", Text),
    ColumnSpec::col("sequence", Integer),
    ColumnSpec::col("status", Text),
    ColumnSpec::col("description", Text),
    ColumnSpec::col("vendor", Text),
];

/// Derived tables in provisioning order.
pub const DERIVED_TABLES: &[(&str, &[ColumnSpec])] = &[
    (VENDOR_OPERATIONS, VENDOR_OPERATIONS_COLUMNS),
    (WORK_CENTERS, WORK_CENTERS_COLUMNS),
    (JOB_TIMELINE, JOB_TIMELINE_COLUMNS),
];

#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub table: String,
    pub state: TableState,
}

pub struct SchemaProvisioner<'a> {
    store: &'a dyn Store,
}

impl<'a> SchemaProvisioner<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create `table` if absent. Safe to call on every run.
    pub fn ensure(&self, table: &str, columns: &[ColumnSpec]) -> Result<TableState, ReconError> {
        let state = self
            .store
            .ensure_table(table, columns)
            .map_err(|source| ReconError::ProvisionFailure { table: table.to_string(), source })?;
        if state == TableState::Created {
            log::info!("created derived table {table}");
        }
        Ok(state)
    }

    /// Provision every derived table, stopping at the first failure.
    pub fn ensure_all(&self) -> Result<Vec<Provisioned>, ReconError> {
        DERIVED_TABLES
            .iter()
            .map(|(table, columns)| {
                self.ensure(table, columns).map(|state| Provisioned {
                    table: table.to_string(),
                    state,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};

    #[test]
    fn ensure_all_creates_then_reports_existing() {
        let store = MemoryStore::new();
        let provisioner = SchemaProvisioner::new(&store);

        let first = provisioner.ensure_all().unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|p| p.state == TableState::Created));

        let second = provisioner.ensure_all().unwrap();
        assert!(second.iter().all(|p| p.state == TableState::AlreadyExists));
    }

    #[test]
    fn failure_is_provision_failure() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::EnsureTable, WORK_CENTERS);
        let err = SchemaProvisioner::new(&store).ensure_all().unwrap_err();
        assert!(matches!(err, ReconError::ProvisionFailure { ref table, .. } if table == WORK_CENTERS));
        // Tables before the failing one were still created
        assert!(store.has_table(VENDOR_OPERATIONS));
        assert!(!store.has_table(JOB_TIMELINE));
    }

    #[test]
    fn derived_schemas_declare_natural_keys() {
        for (table, columns) in DERIVED_TABLES {
            assert!(columns.iter().any(|c| c.key), "{table} has no key column");
        }
    }
}
