//! Links purchase orders to jobs through the canonical identifier.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ReconError;
use crate::matcher::{normalize_opt, CanonicalId};
use crate::model::{Job, PurchaseOrder, LINKED_JOB_COLUMN};
use crate::schema::PURCHASE_ORDERS;
use crate::store::{Row, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    /// Orders whose link was written by this call.
    pub linked: usize,
    /// Orders already pointing at their job.
    pub already_linked: usize,
    /// Orders with no matching job. Not an error.
    pub unmatched: usize,
}

/// One pending write: set `job_number` on the order identified by `key_column = key`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkUpdate {
    pub key_column: String,
    pub key: Value,
    pub job_number: String,
}

/// Decide which orders need their link written. Pure; no store access.
pub fn plan_links(jobs: &[Job], orders: &[PurchaseOrder]) -> (Vec<LinkUpdate>, LinkReport) {
    let mut by_id: BTreeMap<&str, &Job> = BTreeMap::new();
    for job in jobs {
        let CanonicalId::Key(ref id) = job.canonical else {
            continue;
        };
        if let Some(first) = by_id.get(id.as_str()) {
            log::warn!(
                "jobs '{}' and '{}' share canonical id {id}; keeping the first",
                first.job_number,
                job.job_number
            );
            continue;
        }
        by_id.insert(id, job);
    }

    let mut report = LinkReport::default();
    let mut updates = Vec::new();

    for po in orders {
        let canonical = normalize_opt(po.raw_job_id());
        let job = canonical.as_str().and_then(|id| by_id.get(id));
        let Some(job) = job else {
            report.unmatched += 1;
            continue;
        };

        if po.job_number.as_deref() == Some(job.job_number.as_str()) {
            report.already_linked += 1;
            continue;
        }

        let Some((key_column, key)) = po.document_key.clone() else {
            log::warn!(
                "purchase order for job {} has no purchasing document; cannot link",
                job.job_number
            );
            report.unmatched += 1;
            continue;
        };

        report.linked += 1;
        updates.push(LinkUpdate {
            key_column,
            key,
            job_number: job.job_number.clone(),
        });
    }

    (updates, report)
}

pub struct RelationshipLinker<'a> {
    store: &'a dyn Store,
}

impl<'a> RelationshipLinker<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Write missing links back to the purchase-order table.
    /// Only `job_number` is touched; every other column is left as imported.
    pub fn link(&self, jobs: &[Job], orders: &[PurchaseOrder]) -> Result<LinkReport, ReconError> {
        let (updates, report) = plan_links(jobs, orders);

        let mut by_column: BTreeMap<String, Vec<Row>> = BTreeMap::new();
        for update in updates {
            let mut row = Row::new();
            row.insert(update.key_column.clone(), update.key);
            row.insert(LINKED_JOB_COLUMN.to_string(), Value::String(update.job_number));
            by_column.entry(update.key_column).or_default().push(row);
        }

        for (key_column, rows) in &by_column {
            self.store
                .upsert(PURCHASE_ORDERS, rows, &[key_column.as_str()])
                .map_err(|e| ReconError::write(PURCHASE_ORDERS, e))?;
        }

        log::info!(
            "po links: {} linked, {} already linked, {} unmatched",
            report.linked,
            report.already_linked,
            report.unmatched
        );
        Ok(report)
    }
}
