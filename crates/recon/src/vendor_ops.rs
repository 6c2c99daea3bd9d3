//! Vendor operations: SAP operations routed through an outsourced work center.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::VendorCenters;
use crate::error::ReconError;
use crate::model::{from_rows, to_row, SapOperation, VendorOpStatus, VendorOperation};
use crate::report::ReplaceResult;
use crate::schema::VENDOR_OPERATIONS;
use crate::store::{Filter, Row, Store};

type VendorKey = (String, String, String);

fn key_of(op: &VendorOperation) -> VendorKey {
    (op.job_number.clone(), op.operation_number.clone(), op.vendor.clone())
}

/// SAP system status → vendor-op status. `CNF`/`TECO`/`CLSD` close the op,
/// `PCNF` or booked actual work means it is underway.
fn derive_status(op: &SapOperation) -> VendorOpStatus {
    let status = op.status.as_deref().unwrap_or("").to_uppercase();
    let tokens: Vec<&str> = status.split_whitespace().collect();
    if tokens.iter().any(|t| matches!(*t, "CNF" | "TECO" | "CLSD")) {
        VendorOpStatus::Complete
    } else if tokens.contains(&"PCNF") || op.actual_work > 0.0 {
        VendorOpStatus::InProgress
    } else {
        VendorOpStatus::Planned
    }
}

fn derive_notes(op: &SapOperation) -> Option<String> {
    if op.planned_work <= 0.0 && op.actual_work <= 0.0 {
        return None;
    }
    Some(format!("actual {} of {} planned", op.actual_work, op.planned_work))
}

/// Compute the vendor operations for `ops`.
///
/// Returns the canonical job ids present in the input (the replace scope) and
/// the derived rows sorted by natural key. Duplicate keys keep the first row.
pub fn derive_vendor_operations(
    ops: &[SapOperation],
    vendors: &VendorCenters,
) -> (BTreeSet<String>, Vec<VendorOperation>) {
    let mut scope = BTreeSet::new();
    let mut derived: BTreeMap<VendorKey, VendorOperation> = BTreeMap::new();

    for op in ops {
        let Some(job) = op.canonical.as_str() else {
            continue;
        };
        scope.insert(job.to_string());

        let Some(work_center) = op.work_center.as_deref() else {
            continue;
        };
        if !vendors.contains(work_center) {
            continue;
        }
        let Some(operation_number) = op.operation_number.clone() else {
            log::debug!("vendor operation on job {job} has no operation number; skipped");
            continue;
        };

        let record = VendorOperation {
            job_number: job.to_string(),
            operation_number,
            vendor: work_center.to_string(),
            vendor_name: vendors.name(work_center).map(str::to_string),
            description: op.description.clone(),
            start_date: op.start_date,
            end_date: op.finish_date.or(op.start_date),
            status: derive_status(op),
            notes: derive_notes(op),
        };
        derived.entry(key_of(&record)).or_insert(record);
    }

    (scope, derived.into_values().collect())
}

pub struct VendorOperationGenerator<'a> {
    store: &'a dyn Store,
}

impl<'a> VendorOperationGenerator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Replace the vendor operations of every job present in `ops`.
    /// Jobs absent from `ops` keep their rows.
    pub fn generate(
        &self,
        ops: &[SapOperation],
        vendors: &VendorCenters,
    ) -> Result<ReplaceResult, ReconError> {
        let (scope, computed) = derive_vendor_operations(ops, vendors);
        if scope.is_empty() {
            return Ok(ReplaceResult::default());
        }

        let scope_filter = Filter::any_of("job_number", scope.iter().cloned());
        let existing = self
            .store
            .query(VENDOR_OPERATIONS, &scope_filter)
            .map_err(|e| ReconError::query(VENDOR_OPERATIONS, e))?;

        let unchanged = from_rows::<VendorOperation>(existing).is_some_and(|mut current| {
            current.sort_by_key(key_of);
            current == computed
        });
        if unchanged {
            log::debug!("vendor operations unchanged for {} job(s)", scope.len());
            return Ok(ReplaceResult { count: computed.len(), changed: false });
        }

        let rows: Vec<Row> = computed.iter().map(to_row).collect();
        self.store
            .replace(VENDOR_OPERATIONS, &rows, &scope_filter)
            .map_err(|e| ReconError::write(VENDOR_OPERATIONS, e))?;

        log::info!(
            "vendor operations: {} row(s) across {} job(s)",
            computed.len(),
            scope.len()
        );
        Ok(ReplaceResult { count: computed.len(), changed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::normalize;
    use crate::memory::MemoryStore;
    use crate::schema::SchemaProvisioner;
    use serde_json::json;

    fn op(order: &str, operation: &str, wc: &str) -> SapOperation {
        SapOperation {
            order_number: Some(order.into()),
            canonical: normalize(order),
            operation_number: Some(operation.into()),
            work_center: Some(wc.into()),
            description: Some(format!("op {operation}")),
            planned_work: 0.0,
            actual_work: 0.0,
            status: None,
            start_date: None,
            finish_date: None,
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        SchemaProvisioner::new(&store).ensure_all().unwrap();
        store
    }

    #[test]
    fn only_vendor_work_centers_produce_rows() {
        let vendors = VendorCenters::new(["SR"]);
        let ops = vec![op("100575126", "0020", "SR"), op("100575126", "0010", "ASM")];
        let (scope, derived) = derive_vendor_operations(&ops, &vendors);
        assert_eq!(scope.len(), 1);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].operation_number, "0020");
        assert_eq!(derived[0].vendor, "SR");
        assert_eq!(derived[0].status, VendorOpStatus::Planned);
    }

    #[test]
    fn status_from_sap_system_status() {
        let mut o = op("1", "0020", "SR");
        o.status = Some("REL CNF".into());
        assert_eq!(derive_status(&o), VendorOpStatus::Complete);
        o.status = Some("REL PCNF".into());
        assert_eq!(derive_status(&o), VendorOpStatus::InProgress);
        o.status = Some("REL".into());
        o.actual_work = 1.5;
        assert_eq!(derive_status(&o), VendorOpStatus::InProgress);
    }

    #[test]
    fn duplicate_keys_collapse() {
        let vendors = VendorCenters::new(["SR"]);
        let ops = vec![op("J-1", "0020", "SR"), op("j1", "0020", "sr")];
        let (_, derived) = derive_vendor_operations(&ops, &vendors);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].job_number, "J1");
    }

    #[test]
    fn generate_then_no_change() {
        let store = store();
        let generator = VendorOperationGenerator::new(&store);
        let vendors = VendorCenters::new(["SR"]).with_name("SR", "Acme");
        let ops = vec![op("100575126", "0020", "SR"), op("100575126", "0010", "ASM")];

        let first = generator.generate(&ops, &vendors).unwrap();
        assert_eq!(first, ReplaceResult { count: 1, changed: true });
        let after_first = store.rows(VENDOR_OPERATIONS);
        assert_eq!(after_first[0]["vendor_name"], "Acme");

        let second = generator.generate(&ops, &vendors).unwrap();
        assert_eq!(second, ReplaceResult { count: 1, changed: false });
        assert_eq!(store.rows(VENDOR_OPERATIONS), after_first);
    }

    #[test]
    fn regeneration_drops_stale_rows_of_touched_jobs_only() {
        let store = store();
        let generator = VendorOperationGenerator::new(&store);
        let vendors = VendorCenters::new(["SR"]);

        // A job that is no longer in the raw data keeps its rows
        store.load_rows(
            VENDOR_OPERATIONS,
            [json!({
                "job_number": "OLDJOB", "operation_number": "0010", "vendor": "SR",
                "vendor_name": null, "description": null, "start_date": null,
                "end_date": null, "status": "complete", "notes": null,
            })
            .as_object()
            .cloned()
            .unwrap()],
        );

        generator.generate(&[op("1", "0020", "SR")], &vendors).unwrap();
        assert_eq!(store.rows(VENDOR_OPERATIONS).len(), 2);

        // Operation moved in-house: the job's vendor row disappears
        generator.generate(&[op("1", "0020", "ASM")], &vendors).unwrap();
        let rows = store.rows(VENDOR_OPERATIONS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["job_number"], "OLDJOB");
    }

    #[test]
    fn rows_without_order_number_are_ignored() {
        let vendors = VendorCenters::new(["SR"]);
        let ops = vec![op("", "0020", "SR")];
        let (scope, derived) = derive_vendor_operations(&ops, &vendors);
        assert!(scope.is_empty());
        assert!(derived.is_empty());
    }
}
