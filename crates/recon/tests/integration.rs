use std::collections::BTreeMap;
use std::path::PathBuf;

use proptest::prelude::*;
use serde_json::Value;

use shopfloor_recon::memory::StoreOp;
use shopfloor_recon::schema::{
    JOBS, JOB_TIMELINE, PURCHASE_ORDERS, SAP_OPERATIONS, VENDOR_OPERATIONS, WORK_CENTERS,
};
use shopfloor_recon::{
    matcher, run_all, Field, MemoryStore, ReconConfig, Row, StepName, StepStatus, Verdict,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn config() -> ReconConfig {
    ReconConfig::from_file(&fixtures_dir().join("plant.recon.toml")).unwrap()
}

fn plant_store() -> MemoryStore {
    let raw = std::fs::read_to_string(fixtures_dir().join("plant.json")).unwrap();
    let tables: BTreeMap<String, Vec<Row>> = serde_json::from_str(&raw).unwrap();
    let store = MemoryStore::new();
    for (table, rows) in tables {
        store.load_rows(&table, rows);
    }
    store
}

fn rows_for(store: &MemoryStore, table: &str, job: &str) -> Vec<Row> {
    store
        .rows(table)
        .into_iter()
        .filter(|r| r["job_number"] == job)
        .collect()
}

// -------------------------------------------------------------------------
// End-to-end
// -------------------------------------------------------------------------

#[test]
fn plant_scenario() {
    let store = plant_store();
    let report = run_all(&store, &config()).unwrap();

    assert_eq!(report.verdict, Verdict::Ok, "{:#?}", report.summary_lines());
    assert_eq!(report.config_name, "Plant 1");
    assert_eq!(
        report.step(StepName::PoLinks).unwrap().detail,
        "2 linked, 0 already linked, 1 unmatched"
    );

    // One vendor operation (SR) for the job; DNI and ASM are in-house
    let vendor_ops = rows_for(&store, VENDOR_OPERATIONS, "100575126");
    assert_eq!(vendor_ops.len(), 1);
    assert_eq!(vendor_ops[0]["vendor"], "SR");
    assert_eq!(vendor_ops[0]["vendor_name"], "Acme Ship & Repair");
    assert_eq!(vendor_ops[0]["status"], "planned");
    assert_eq!(vendor_ops[0]["start_date"], "2024-01-08");
    assert_eq!(vendor_ops[0]["end_date"], "2024-01-12");

    let osp = rows_for(&store, VENDOR_OPERATIONS, "J1005");
    assert_eq!(osp.len(), 1);
    assert_eq!(osp[0]["status"], "in_progress");

    // Registry holds every observed work center exactly once
    let mut centers: Vec<String> = store
        .rows(WORK_CENTERS)
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    centers.sort();
    assert_eq!(centers, vec!["ASM", "DNI", "OSP", "SR"]);

    // Linked orders carry the job's own number; the stray order stays null
    let orders = store.rows(PURCHASE_ORDERS);
    let link = |doc: &str| {
        orders
            .iter()
            .find(|r| r["Purchasing Document"] == doc)
            .and_then(|r| r.get("job_number").cloned())
    };
    assert_eq!(link("4500001"), Some(Value::from("100575126")));
    assert_eq!(link("4500002"), Some(Value::from("J-1005")));
    assert_eq!(link("4500003"), None);

    // Shipment on 01-03 precedes the order on 01-05; undated log skipped
    let mut timeline = rows_for(&store, JOB_TIMELINE, "100575126");
    timeline.sort_by_key(|r| r["sequence"].as_i64());
    let ids: Vec<&str> = timeline.iter().map(|r| r["source_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["SL-1", "4500001"]);
    assert_eq!(timeline[1]["status"], "ordered");
    let timeline_step = report.step(StepName::Timeline).unwrap();
    assert!(timeline_step.detail.contains("1 undated skipped"), "{}", timeline_step.detail);
}

#[test]
fn rerun_is_idempotent() {
    let store = plant_store();
    let first = run_all(&store, &config()).unwrap();
    let snapshot: Vec<Vec<Row>> = [VENDOR_OPERATIONS, WORK_CENTERS, JOB_TIMELINE]
        .iter()
        .map(|t| store.rows(t))
        .collect();

    let second = run_all(&store, &config()).unwrap();
    assert_eq!(first.digest, second.digest);
    assert_eq!(
        second.step(StepName::PoLinks).unwrap().detail,
        "0 linked, 2 already linked, 1 unmatched"
    );
    for step in &second.steps {
        assert_eq!(step.status, StepStatus::NoChange, "{}", step.summary_line());
    }
    for (table, before) in [VENDOR_OPERATIONS, WORK_CENTERS, JOB_TIMELINE].iter().zip(snapshot) {
        assert_eq!(store.rows(table), before);
    }
}

#[test]
fn changed_raw_data_converges() {
    let store = plant_store();
    run_all(&store, &config()).unwrap();

    // Job 100575126 drops out of the SAP export; J1005 gains a second vendor op
    let kept: Vec<Row> = store
        .rows(SAP_OPERATIONS)
        .into_iter()
        .filter(|r| r["Sales Document"] == "J1005")
        .collect();
    let fresh = MemoryStore::new();
    for table in [JOBS, PURCHASE_ORDERS, VENDOR_OPERATIONS, WORK_CENTERS, JOB_TIMELINE] {
        fresh.load_rows(table, store.rows(table));
    }
    let mut extra = kept[0].clone();
    extra.insert("Operation".into(), "0040".into());
    fresh.load_rows(SAP_OPERATIONS, kept.into_iter().chain([extra]));

    let report = run_all(&fresh, &config()).unwrap();
    assert!(report.is_ok());

    // Vendor rows of jobs absent from the input survive
    assert_eq!(rows_for(&fresh, VENDOR_OPERATIONS, "100575126").len(), 1);
    assert_eq!(rows_for(&fresh, VENDOR_OPERATIONS, "J1005").len(), 2);
    // The registry is rebuilt from scratch
    assert_eq!(fresh.rows(WORK_CENTERS).len(), 1);
}

// -------------------------------------------------------------------------
// Step gating
// -------------------------------------------------------------------------

#[test]
fn linker_failure_blocks_timeline_but_not_work_centers() {
    let store = plant_store();
    store.fail_on(StoreOp::Upsert, PURCHASE_ORDERS);
    let report = run_all(&store, &config()).unwrap();

    assert_eq!(report.verdict, Verdict::Partial);
    let links = report.step(StepName::PoLinks).unwrap();
    assert_eq!(links.status, StepStatus::Failed);
    assert_eq!(links.error_kind, Some("write_failure"));
    assert_eq!(report.step(StepName::VendorOps).unwrap().status, StepStatus::Success);
    assert_eq!(report.step(StepName::WorkCenters).unwrap().status, StepStatus::Success);
    assert_eq!(report.step(StepName::Timeline).unwrap().status, StepStatus::Skipped);
    assert!(store.rows(JOB_TIMELINE).is_empty());
}

#[test]
fn provision_failure_aborts_the_run() {
    let store = plant_store();
    store.fail_on(StoreOp::EnsureTable, JOB_TIMELINE);
    let report = run_all(&store, &config()).unwrap();

    assert_eq!(report.verdict, Verdict::Aborted);
    assert_eq!(report.steps.len(), 5);
    assert_eq!(report.steps[0].error_kind, Some("provision_failure"));
    for step in &report.steps[1..] {
        assert_eq!(step.status, StepStatus::Skipped);
    }
    assert!(store.rows(PURCHASE_ORDERS).iter().all(|r| r.get("job_number").is_none()));
}

#[test]
fn report_serializes_for_the_dashboard() {
    let store = plant_store();
    let report = run_all(&store, &config()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["verdict"], "ok");
    assert_eq!(json["aborted"], false);
    let names: Vec<&str> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["provision", "po_links", "vendor_ops", "work_centers", "timeline"]);
    assert!(json["digest"].as_str().unwrap().starts_with("sha256:"));
}

#[test]
fn closure_resolver_reads_custom_columns() {
    use shopfloor_recon::alias::FieldResolver;
    use shopfloor_recon::model::Job;

    let resolver = |row: &Row, field: Field| match field {
        Field::JobNumber => row.get("JOBNO").map(|v| ("JOBNO".to_string(), v.clone())),
        _ => None,
    };
    let row: Row = serde_json::from_str(r#"{"JOBNO": " 42 "}"#).unwrap();
    assert_eq!(resolver.value(&row, Field::JobNumber), Some(Value::from(" 42 ")));
    let job = Job::from_row(&row, &resolver).unwrap();
    assert_eq!(job.job_number, "42");
}

// -------------------------------------------------------------------------
// Identifier properties
// -------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in "[ -~]{0,20}") {
        let once = matcher::normalize(&raw);
        if let Some(key) = once.as_str() {
            prop_assert_eq!(matcher::normalize(key), once.clone());
        }
    }

    #[test]
    fn separators_and_case_do_not_matter(id in "[A-Za-z][A-Za-z0-9]{0,8}", sep in "[ ./_-]") {
        let spaced = format!("  {}{}{} ", &id[..1], sep, &id[1..]);
        prop_assert!(matcher::matches(&spaced, &id.to_lowercase()));
    }

    #[test]
    fn blank_never_matches(other in "[ -~]{0,12}") {
        prop_assert!(!matcher::matches("   ", &other));
    }
}
