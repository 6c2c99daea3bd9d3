//! Reading the raw import tables into typed records.

use crate::alias::FieldResolver;
use crate::error::ReconError;
use crate::model::{Job, PurchaseOrder, SapOperation, ShipmentLog};
use crate::schema::{JOBS, PURCHASE_ORDERS, SAP_OPERATIONS, SHIPMENT_LOGS};
use crate::store::{Filter, Row, Store, StoreError};

/// All rows of a raw table. A table that was never imported reads as empty.
pub fn load_rows(store: &dyn Store, table: &str) -> Result<Vec<Row>, ReconError> {
    match store.query(table, &Filter::All) {
        Ok(rows) => Ok(rows),
        Err(StoreError::NoSuchTable(_)) => {
            log::warn!("raw table {table} does not exist yet; treating it as empty");
            Ok(Vec::new())
        }
        Err(e) => Err(ReconError::query(table, e)),
    }
}

pub fn load_jobs(store: &dyn Store, resolver: &dyn FieldResolver) -> Result<Vec<Job>, ReconError> {
    let rows = load_rows(store, JOBS)?;
    let total = rows.len();
    let jobs: Vec<Job> = rows.iter().filter_map(|r| Job::from_row(r, resolver)).collect();
    if jobs.len() < total {
        log::warn!("{} job row(s) have no job number and were ignored", total - jobs.len());
    }
    Ok(jobs)
}

pub fn load_sap_operations(
    store: &dyn Store,
    resolver: &dyn FieldResolver,
) -> Result<Vec<SapOperation>, ReconError> {
    Ok(load_rows(store, SAP_OPERATIONS)?
        .iter()
        .map(|r| SapOperation::from_row(r, resolver))
        .collect())
}

pub fn load_purchase_orders(
    store: &dyn Store,
    resolver: &dyn FieldResolver,
) -> Result<Vec<PurchaseOrder>, ReconError> {
    Ok(load_rows(store, PURCHASE_ORDERS)?
        .iter()
        .map(|r| PurchaseOrder::from_row(r, resolver))
        .collect())
}

pub fn load_shipment_logs(
    store: &dyn Store,
    resolver: &dyn FieldResolver,
) -> Result<Vec<ShipmentLog>, ReconError> {
    Ok(load_rows(store, SHIPMENT_LOGS)?
        .iter()
        .map(|r| ShipmentLog::from_row(r, resolver))
        .collect())
}
