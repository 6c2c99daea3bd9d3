//! Per-job timeline merged from purchase-order and shipment-log events.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ReconError;
use crate::matcher::{normalize_opt, CanonicalId};
use crate::model::{from_rows, to_row, EventSource, Job, PurchaseOrder, ShipmentLog, TimelineEvent};
use crate::report::ReplaceResult;
use crate::schema::JOB_TIMELINE;
use crate::store::{Filter, Row, Store};

/// Events computed for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    /// Events dropped because their date was missing or unparseable.
    pub skipped_undated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    pub jobs: usize,
    pub result: ReplaceResult,
    pub skipped_undated: usize,
}

fn po_status(po: &PurchaseOrder) -> String {
    if let Some(status) = &po.status {
        return status.clone();
    }
    let ordered = po.order_quantity.unwrap_or(0.0);
    let received = po.received_quantity.unwrap_or(0.0);
    if ordered > 0.0 && received >= ordered {
        "received".into()
    } else if received > 0.0 {
        "partially_received".into()
    } else {
        "ordered".into()
    }
}

fn po_description(po: &PurchaseOrder, source_id: &str) -> String {
    let mut out = format!("Purchase order {source_id}");
    if let Some(material) = &po.material {
        out.push_str(&format!(": {material}"));
    }
    if let Some(ordered) = po.order_quantity {
        let received = po.received_quantity.unwrap_or(0.0);
        out.push_str(&format!(" ({received} of {ordered} received)"));
    }
    out
}

fn shipment_description(log: &ShipmentLog, source_id: &str) -> String {
    match (&log.description, &log.severity) {
        (Some(d), Some(s)) => format!("[{s}] {d}"),
        (Some(d), None) => d.clone(),
        (None, Some(s)) => format!("[{s}] Shipment log {source_id}"),
        (None, None) => format!("Shipment log {source_id}"),
    }
}

struct Pending {
    date: NaiveDate,
    source: EventSource,
    source_id: String,
    status: String,
    description: String,
    vendor: Option<String>,
}

/// Order `pos` and `shipments` (already selected for `job`) into a timeline.
///
/// Sorted by date, purchase orders before shipments on the same day, then
/// input order. A repeated `(date, source, source_id)` keeps its first
/// occurrence; an order and a shipment log may share an id.
pub fn build_timeline(job: &str, pos: &[&PurchaseOrder], shipments: &[&ShipmentLog]) -> Timeline {
    let mut pending = Vec::with_capacity(pos.len() + shipments.len());
    let mut skipped_undated = 0;

    for (i, po) in pos.iter().enumerate() {
        let Some(date) = po.document_date else {
            skipped_undated += 1;
            continue;
        };
        let source_id = po.purchasing_document.clone().unwrap_or_else(|| format!("po-{}", i + 1));
        pending.push(Pending {
            date,
            source: EventSource::PurchaseOrder,
            status: po_status(po),
            description: po_description(po, &source_id),
            vendor: po.vendor.clone(),
            source_id,
        });
    }

    for (i, log) in shipments.iter().enumerate() {
        let Some(date) = log.shipment_date else {
            skipped_undated += 1;
            continue;
        };
        let source_id = log.id.clone().unwrap_or_else(|| format!("log-{}", i + 1));
        pending.push(Pending {
            date,
            source: EventSource::Shipment,
            status: log.status.clone().unwrap_or_else(|| "logged".into()),
            description: shipment_description(log, &source_id),
            vendor: log.vendor.clone(),
            source_id,
        });
    }

    // Stable: equal (date, source) keep input order
    pending.sort_by_key(|p| (p.date, p.source));

    let mut seen = BTreeSet::new();
    let events = pending
        .into_iter()
        .filter(|p| seen.insert((p.date, p.source, p.source_id.clone())))
        .enumerate()
        .map(|(sequence, p)| TimelineEvent {
            job_number: job.to_string(),
            event_date: p.date,
            source: p.source,
            source_id: p.source_id,
            sequence: sequence as i64,
            status: p.status,
            description: p.description,
            vendor: p.vendor,
        })
        .collect();

    Timeline { events, skipped_undated }
}

pub struct TimelineGenerator<'a> {
    store: &'a dyn Store,
}

impl<'a> TimelineGenerator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Rebuild one job's timeline. Orders belong to the job through their
    /// linked `job_number`, shipment logs through their raw job number.
    pub fn generate(
        &self,
        job: &Job,
        pos: &[PurchaseOrder],
        shipments: &[ShipmentLog],
    ) -> Result<ReplaceResult, ReconError> {
        let Some(id) = job.canonical.as_str() else {
            return Ok(ReplaceResult::default());
        };
        let pos: Vec<&PurchaseOrder> = pos
            .iter()
            .filter(|po| normalize_opt(po.job_number.as_deref()).matches(&job.canonical))
            .collect();
        let shipments: Vec<&ShipmentLog> =
            shipments.iter().filter(|s| s.canonical.matches(&job.canonical)).collect();

        let timeline = build_timeline(id, &pos, &shipments);
        if timeline.skipped_undated > 0 {
            log::debug!("timeline {id}: {} undated event(s) skipped", timeline.skipped_undated);
        }
        self.write(id, &timeline.events)
    }

    /// Rebuild the timeline of every job. Jobs sharing a canonical id are built once.
    pub fn generate_all(
        &self,
        jobs: &[Job],
        pos: &[PurchaseOrder],
        shipments: &[ShipmentLog],
    ) -> Result<TimelineSummary, ReconError> {
        let mut pos_by_job: BTreeMap<CanonicalId, Vec<&PurchaseOrder>> = BTreeMap::new();
        for po in pos {
            let id = normalize_opt(po.job_number.as_deref());
            if !id.is_unmatched() {
                pos_by_job.entry(id).or_default().push(po);
            }
        }
        let mut logs_by_job: BTreeMap<&CanonicalId, Vec<&ShipmentLog>> = BTreeMap::new();
        for log in shipments.iter().filter(|s| !s.canonical.is_unmatched()) {
            logs_by_job.entry(&log.canonical).or_default().push(log);
        }

        let mut summary = TimelineSummary::default();
        let mut done = BTreeSet::new();
        for job in jobs {
            let Some(id) = job.canonical.as_str() else {
                continue;
            };
            if !done.insert(id) {
                continue;
            }
            let job_pos = pos_by_job.get(&job.canonical).map(Vec::as_slice).unwrap_or(&[]);
            let job_logs = logs_by_job.get(&job.canonical).map(Vec::as_slice).unwrap_or(&[]);

            let timeline = build_timeline(id, job_pos, job_logs);
            summary.skipped_undated += timeline.skipped_undated;
            summary.result = summary.result.merge(self.write(id, &timeline.events)?);
            summary.jobs += 1;
        }

        log::info!(
            "timeline: {} event(s) across {} job(s), {} undated skipped",
            summary.result.count,
            summary.jobs,
            summary.skipped_undated
        );
        Ok(summary)
    }

    fn write(&self, job: &str, events: &[TimelineEvent]) -> Result<ReplaceResult, ReconError> {
        let scope = Filter::eq("job_number", job);
        let existing = self
            .store
            .query(JOB_TIMELINE, &scope)
            .map_err(|e| ReconError::query(JOB_TIMELINE, e))?;
        let unchanged = from_rows::<TimelineEvent>(existing).is_some_and(|mut current| {
            current.sort_by_key(|e| e.sequence);
            current == events
        });
        if unchanged {
            return Ok(ReplaceResult { count: events.len(), changed: false });
        }

        let rows: Vec<Row> = events.iter().map(to_row).collect();
        self.store
            .replace(JOB_TIMELINE, &rows, &scope)
            .map_err(|e| ReconError::write(JOB_TIMELINE, e))?;
        Ok(ReplaceResult { count: events.len(), changed: true })
    }
}
