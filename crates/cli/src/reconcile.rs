//! `shopfloor reconcile` and `shopfloor status`.

use std::path::PathBuf;

use serde::Serialize;

use shopfloor_io::SqliteStore;
use shopfloor_recon::digest::derived_digest;
use shopfloor_recon::schema::{
    JOBS, JOB_TIMELINE, PURCHASE_ORDERS, SAP_OPERATIONS, SHIPMENT_LOGS, VENDOR_OPERATIONS, WORK_CENTERS,
};
use shopfloor_recon::{run_all, Filter, MemoryStore, Report, Store, Verdict};

use crate::exit_codes::verdict_exit_code;
use crate::{emit_json, to_json, CliError, Context};

const STATUS_TABLES: [&str; 7] = [
    JOBS,
    SAP_OPERATIONS,
    PURCHASE_ORDERS,
    SHIPMENT_LOGS,
    VENDOR_OPERATIONS,
    WORK_CENTERS,
    JOB_TIMELINE,
];

pub fn cmd_reconcile(
    ctx: &Context,
    json_output: bool,
    output_file: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), CliError> {
    let config = ctx.recon_config()?;
    let store = ctx.open_store()?;

    let report = if dry_run {
        let scratch = snapshot(&store)?;
        run_all(&scratch, &config).map_err(CliError::recon)?
    } else {
        run_all(&store, &config).map_err(CliError::recon)?
    };

    if json_output || output_file.is_some() {
        let json_str = to_json(&report)?;
        emit_json(&json_str, json_output, output_file.as_deref())?;
    }

    print_summary(&report, dry_run);

    match verdict_exit_code(report.verdict) {
        0 => Ok(()),
        code => Err(CliError {
            code,
            message: format!("reconcile verdict: {}", verdict_label(report.verdict)),
            hint: None,
        }),
    }
}

/// Human summary to stderr.
fn print_summary(report: &Report, dry_run: bool) {
    eprintln!(
        "reconcile '{}'{}: verdict {}",
        report.config_name,
        if dry_run { " (dry run)" } else { "" },
        verdict_label(report.verdict),
    );
    for step in &report.steps {
        eprintln!("  {} [{}ms]", step.summary_line(), step.duration_ms);
    }
    if let Some(digest) = &report.digest {
        eprintln!("  digest: {digest}");
    }
    if dry_run {
        eprintln!("dry run: database not modified");
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Ok => "ok",
        Verdict::Partial => "partial",
        Verdict::Aborted => "aborted",
    }
}

/// Copy every table into a scratch store so a run can be previewed.
fn snapshot(store: &SqliteStore) -> Result<MemoryStore, CliError> {
    let scratch = MemoryStore::new();
    let tables = store
        .tables()
        .map_err(|e| CliError::runtime(format!("cannot list tables: {e}")))?;
    for table in tables {
        let rows = store
            .query(&table, &Filter::All)
            .map_err(|e| CliError::runtime(format!("cannot read {table}: {e}")))?;
        log::debug!("dry run: copied {} row(s) from {table}", rows.len());
        scratch.load_rows(&table, rows);
    }
    Ok(scratch)
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    database: String,
    tables: Vec<TableCount>,
    /// Absent until the derived tables exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

#[derive(Debug, Serialize)]
struct TableCount {
    name: &'static str,
    /// None = table not created yet.
    rows: Option<u64>,
}

pub fn cmd_status(ctx: &Context, json_output: bool) -> Result<(), CliError> {
    let path = ctx.database_path();
    let store = ctx.open_store()?;

    let mut tables = Vec::with_capacity(STATUS_TABLES.len());
    for name in STATUS_TABLES {
        let exists = store
            .has_table(name)
            .map_err(|e| CliError::runtime(format!("cannot inspect {name}: {e}")))?;
        let rows = if exists {
            Some(
                store
                    .count(name)
                    .map_err(|e| CliError::runtime(format!("cannot count {name}: {e}")))?,
            )
        } else {
            None
        };
        tables.push(TableCount { name, rows });
    }

    let digest = match derived_digest(&store) {
        Ok(digest) => Some(digest),
        Err(e) => {
            log::debug!("no digest: {e}");
            None
        }
    };

    let status = StatusOutput { database: path.display().to_string(), tables, digest };

    if json_output {
        println!("{}", to_json(&status)?);
        return Ok(());
    }

    println!("database: {}", status.database);
    for table in &status.tables {
        match table.rows {
            Some(n) => println!("  {:<18} {n:>8}", table.name),
            None => println!("  {:<18} {:>8}", table.name, "-"),
        }
    }
    match &status.digest {
        Some(digest) => println!("digest:   {digest}"),
        None => println!("digest:   none (run `shopfloor reconcile` first)"),
    }
    Ok(())
}
