use std::time::Instant;

use crate::alias::AliasTable;
use crate::config::{ReconConfig, VendorCenters};
use crate::digest::derived_digest;
use crate::error::ReconError;
use crate::linker::RelationshipLinker;
use crate::model::{Job, SapOperation};
use crate::raw::{load_jobs, load_purchase_orders, load_sap_operations, load_shipment_logs};
use crate::report::{ReplaceResult, Report, StepName, StepReport, StepStatus};
use crate::schema::SchemaProvisioner;
use crate::store::{Store, TableState};
use crate::timeline::TimelineGenerator;
use crate::vendor_ops::VendorOperationGenerator;
use crate::work_centers::WorkCenterSynchronizer;

/// Run every step once against `store`.
pub fn run_all(store: &dyn Store, config: &ReconConfig) -> Result<Report, ReconError> {
    Ok(Reconciler::new(store, config)?.run_all())
}

/// Runs the reconciliation steps in dependency order and collects a report.
pub struct Reconciler<'a> {
    store: &'a dyn Store,
    name: String,
    aliases: AliasTable,
    vendors: VendorCenters,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn Store, config: &ReconConfig) -> Result<Self, ReconError> {
        Ok(Self {
            store,
            name: config.name.clone(),
            aliases: config.alias_table()?,
            vendors: config.vendor_centers(),
        })
    }

    /// Provision → PO links → vendor ops → work centers → timeline.
    ///
    /// Step failures never escape: they are recorded in the report. A failed
    /// provision aborts the run; failed PO links skip the timeline only.
    pub fn run_all(&self) -> Report {
        let mut steps = Vec::with_capacity(StepName::ORDER.len());

        let provision = run_step(StepName::Provision, || self.provision());
        let provisioned = provision.ok;
        steps.push(provision);
        if !provisioned {
            for name in &StepName::ORDER[1..] {
                steps.push(StepReport::skipped(*name, "schema provisioning failed"));
            }
            log::error!("reconciliation '{}' aborted", self.name);
            return Report::from_steps(&self.name, steps, None);
        }

        let jobs = load_jobs(self.store, &self.aliases);
        let links = run_step(StepName::PoLinks, || self.link(&jobs));
        let linked = links.ok;
        steps.push(links);

        let ops = load_sap_operations(self.store, &self.aliases);
        steps.push(run_step(StepName::VendorOps, || self.vendor_ops(&ops)));
        steps.push(run_step(StepName::WorkCenters, || self.work_centers(&ops)));

        if linked {
            steps.push(run_step(StepName::Timeline, || self.timeline(&jobs)));
        } else {
            steps.push(StepReport::skipped(StepName::Timeline, "PO links failed"));
        }

        let digest = match derived_digest(self.store) {
            Ok(d) => Some(d),
            Err(e) => {
                log::warn!("cannot compute derived digest: {e}");
                None
            }
        };
        let report = Report::from_steps(&self.name, steps, digest);
        log::info!("reconciliation '{}' finished: {:?}", self.name, report.verdict);
        report
    }

    fn provision(&self) -> Result<StepReport, ReconError> {
        let outcomes = SchemaProvisioner::new(self.store).ensure_all()?;
        let created = outcomes.iter().filter(|p| p.state == TableState::Created).count();
        let status = if created > 0 { StepStatus::Success } else { StepStatus::NoChange };
        let detail = format!("{} tables ready, {created} created", outcomes.len());
        Ok(StepReport::new(StepName::Provision, status, detail))
    }

    fn link(&self, jobs: &Result<Vec<Job>, ReconError>) -> Result<StepReport, ReconError> {
        let jobs = jobs.as_ref().map_err(clone_error)?;
        let orders = load_purchase_orders(self.store, &self.aliases)?;
        let report = RelationshipLinker::new(self.store).link(jobs, &orders)?;
        let status = if report.linked > 0 { StepStatus::Success } else { StepStatus::NoChange };
        let detail = format!(
            "{} linked, {} already linked, {} unmatched",
            report.linked, report.already_linked, report.unmatched
        );
        Ok(StepReport::new(StepName::PoLinks, status, detail))
    }

    fn vendor_ops(
        &self,
        ops: &Result<Vec<SapOperation>, ReconError>,
    ) -> Result<StepReport, ReconError> {
        let ops = ops.as_ref().map_err(clone_error)?;
        let result = VendorOperationGenerator::new(self.store).generate(ops, &self.vendors)?;
        Ok(replace_step(StepName::VendorOps, result, "vendor operations"))
    }

    fn work_centers(
        &self,
        ops: &Result<Vec<SapOperation>, ReconError>,
    ) -> Result<StepReport, ReconError> {
        let ops = ops.as_ref().map_err(clone_error)?;
        let sync = WorkCenterSynchronizer::new(self.store).sync(ops, &self.vendors)?;
        Ok(replace_step(StepName::WorkCenters, sync.result, "work centers"))
    }

    fn timeline(&self, jobs: &Result<Vec<Job>, ReconError>) -> Result<StepReport, ReconError> {
        let jobs = jobs.as_ref().map_err(clone_error)?;
        // Re-read orders so links written by this run are visible
        let orders = load_purchase_orders(self.store, &self.aliases)?;
        let logs = load_shipment_logs(self.store, &self.aliases)?;
        let summary = TimelineGenerator::new(self.store).generate_all(jobs, &orders, &logs)?;

        let mut step = replace_step(StepName::Timeline, summary.result, "events");
        step.detail.push_str(&format!(" across {} jobs", summary.jobs));
        if summary.skipped_undated > 0 {
            step.detail.push_str(&format!(", {} undated skipped", summary.skipped_undated));
        }
        Ok(step)
    }
}

fn run_step<F>(name: StepName, f: F) -> StepReport
where
    F: FnOnce() -> Result<StepReport, ReconError>,
{
    let start = Instant::now();
    match f() {
        Ok(step) => {
            log::debug!("{name}: {}", step.status.label());
            step.timed(start)
        }
        Err(e) => {
            log::error!("{name} failed: {e}");
            StepReport::failed(name, &e).timed(start)
        }
    }
}

fn replace_step(name: StepName, result: ReplaceResult, noun: &str) -> StepReport {
    let status = if result.changed { StepStatus::Success } else { StepStatus::NoChange };
    StepReport::new(name, status, format!("{} {noun}", result.count))
}

/// Input loads are shared by several steps; each failing step reports its own copy.
fn clone_error(e: &ReconError) -> ReconError {
    match e {
        ReconError::QueryFailure { table, source } => ReconError::QueryFailure {
            table: table.clone(),
            source: source.clone(),
        },
        other => ReconError::Io(other.to_string()),
    }
}
