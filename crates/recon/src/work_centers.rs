use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::VendorCenters;
use crate::error::ReconError;
use crate::model::{from_rows, to_row, SapOperation, WorkCenter, WorkCenterKind};
use crate::report::ReplaceResult;
use crate::schema::WORK_CENTERS;
use crate::store::{Filter, Row, Store};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    /// Registry contents after the sync.
    pub work_centers: BTreeSet<String>,
    pub result: ReplaceResult,
}

#[derive(Default)]
struct Tally {
    operations: i64,
    active: i64,
}

/// Build the registry from every distinct work center in `ops`, sorted by name.
pub fn derive_work_centers(ops: &[SapOperation], vendors: &VendorCenters) -> Vec<WorkCenter> {
    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for op in ops {
        let Some(name) = op.work_center.as_deref() else {
            continue;
        };
        let tally = tallies.entry(name).or_default();
        tally.operations += 1;
        if op.actual_work > 0.0 {
            tally.active += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(name, tally)| WorkCenter {
            name: name.to_string(),
            kind: if vendors.contains(name) {
                WorkCenterKind::Vendor
            } else {
                WorkCenterKind::Internal
            },
            status: "active".into(),
            operation_count: tally.operations,
            active_count: tally.active,
            utilization: utilization(tally.active, tally.operations),
        })
        .collect()
}

fn utilization(active: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        active as f64 / total as f64
    }
}

pub struct WorkCenterSynchronizer<'a> {
    store: &'a dyn Store,
}

impl<'a> WorkCenterSynchronizer<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Rebuild the whole registry. Centers no longer observed are removed.
    pub fn sync(
        &self,
        ops: &[SapOperation],
        vendors: &VendorCenters,
    ) -> Result<SyncResult, ReconError> {
        let computed = derive_work_centers(ops, vendors);
        let work_centers: BTreeSet<String> = computed.iter().map(|wc| wc.name.clone()).collect();

        let existing = self
            .store
            .query(WORK_CENTERS, &Filter::All)
            .map_err(|e| ReconError::query(WORK_CENTERS, e))?;
        let unchanged = from_rows::<WorkCenter>(existing).is_some_and(|mut current| {
            current.sort_by(|a, b| a.name.cmp(&b.name));
            current == computed
        });

        let result = if unchanged {
            ReplaceResult { count: computed.len(), changed: false }
        } else {
            let rows: Vec<Row> = computed.iter().map(to_row).collect();
            self.store
                .replace(WORK_CENTERS, &rows, &Filter::All)
                .map_err(|e| ReconError::write(WORK_CENTERS, e))?;
            log::info!("work centers: registry rebuilt with {} center(s)", computed.len());
            ReplaceResult { count: computed.len(), changed: true }
        };

        Ok(SyncResult { work_centers, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::normalize;
    use crate::memory::{MemoryStore, StoreOp};
    use crate::schema::SchemaProvisioner;

    fn op(wc: Option<&str>, actual: f64) -> SapOperation {
        SapOperation {
            order_number: Some("100575126".into()),
            canonical: normalize("100575126"),
            operation_number: Some("0010".into()),
            work_center: wc.map(str::to_string),
            description: None,
            planned_work: 1.0,
            actual_work: actual,
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
    fn distinct_centers_with_utilization() {
        let ops = vec![
            op(Some("DNI"), 0.0),
            op(Some("SR"), 2.0),
            op(Some("SR"), 0.0),
            op(Some("ASM"), 0.0),
            op(None, 5.0),
        ];
        let centers = derive_work_centers(&ops, &VendorCenters::new(["SR"]));
        assert_eq!(centers.len(), 3);
        let sr = centers.iter().find(|c| c.name == "SR").unwrap();
        assert_eq!(sr.kind, WorkCenterKind::Vendor);
        assert_eq!(sr.operation_count, 2);
        assert_eq!(sr.active_count, 1);
        assert_eq!(sr.utilization, 0.5);
        let dni = centers.iter().find(|c| c.name == "DNI").unwrap();
        assert_eq!(dni.kind, WorkCenterKind::Internal);
        assert_eq!(dni.utilization, 0.0);
    }

    #[test]
    fn sync_replaces_registry() {
        let store = store();
        let sync = WorkCenterSynchronizer::new(&store);
        let vendors = VendorCenters::new(["SR"]);

        let first = sync
            .sync(&[op(Some("DNI"), 0.0), op(Some("SR"), 0.0), op(Some("ASM"), 0.0)], &vendors)
            .unwrap();
        assert_eq!(first.work_centers.len(), 3);
        assert!(first.result.changed);

        let second = sync.sync(&[op(Some("SR"), 1.0)], &vendors).unwrap();
        assert_eq!(second.work_centers, BTreeSet::from(["SR".to_string()]));
        let rows = store.rows(WORK_CENTERS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["utilization"], 1.0);
    }

    #[test]
    fn unchanged_registry_is_not_rewritten() {
        let store = store();
        let sync = WorkCenterSynchronizer::new(&store);
        let vendors = VendorCenters::new(["SR"]);
        let ops = [op(Some("SR"), 0.0)];
        sync.sync(&ops, &vendors).unwrap();

        store.fail_on(StoreOp::Replace, WORK_CENTERS);
        let again = sync.sync(&ops, &vendors).unwrap();
        assert!(!again.result.changed);
    }

    #[test]
    fn empty_input_clears_registry() {
        let store = store();
        let sync = WorkCenterSynchronizer::new(&store);
        let vendors = VendorCenters::new(["SR"]);
        sync.sync(&[op(Some("SR"), 0.0)], &vendors).unwrap();
        let cleared = sync.sync(&[], &vendors).unwrap();
        assert!(cleared.work_centers.is_empty());
        assert!(store.rows(WORK_CENTERS).is_empty());
    }
}
