//! `shopfloor timeline` - print one job's derived timeline.

use shopfloor_recon::matcher::{matches, normalize};
use shopfloor_recon::model::{from_rows, EventSource, TimelineEvent};
use shopfloor_recon::schema::JOB_TIMELINE;
use shopfloor_recon::{Filter, Row, Store, StoreError};

use crate::{to_json, CliError, Context};

pub fn cmd_timeline(ctx: &Context, job: &str, json_output: bool) -> Result<(), CliError> {
    if normalize(job).is_unmatched() {
        return Err(CliError::usage("job number is blank"));
    }

    let store = ctx.open_store()?;
    let rows = match store.query(JOB_TIMELINE, &Filter::All) {
        Ok(rows) => rows,
        Err(StoreError::NoSuchTable(_)) => {
            return Err(CliError::runtime("no timelines have been generated yet")
                .with_hint("run `shopfloor reconcile` first"));
        }
        Err(e) => return Err(CliError::runtime(format!("cannot read {JOB_TIMELINE}: {e}"))),
    };

    let events = events_for(rows, job)?;

    if json_output {
        println!("{}", to_json(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        eprintln!("no timeline events for job '{job}'");
        return Ok(());
    }

    println!("job {}: {} event(s)", events[0].job_number, events.len());
    for event in &events {
        let source = match event.source {
            EventSource::PurchaseOrder => "po",
            EventSource::Shipment => "shipment",
        };
        println!(
            "{:>4}  {}  {:<8}  {:<12}  {:<20}  {}",
            event.sequence,
            event.event_date,
            source,
            event.source_id,
            event.status,
            event.description,
        );
    }
    Ok(())
}

/// Events whose job number matches `job` in any spelling, in sequence order.
fn events_for(rows: Vec<Row>, job: &str) -> Result<Vec<TimelineEvent>, CliError> {
    let rows: Vec<Row> = rows
        .into_iter()
        .filter(|row| {
            row.get("job_number")
                .and_then(|v| v.as_str())
                .is_some_and(|stored| matches(stored, job))
        })
        .collect();
    let mut events: Vec<TimelineEvent> = from_rows(rows).ok_or_else(|| {
        CliError::runtime(format!("{JOB_TIMELINE} holds rows that are not timeline events"))
            .with_hint("run `shopfloor reconcile` to regenerate it")
    })?;
    events.sort_by_key(|e| e.sequence);
    Ok(events)
}
