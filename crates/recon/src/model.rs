use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alias::{Field, FieldResolver};
use crate::matcher::{normalize, normalize_opt, CanonicalId};
use crate::store::Row;

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

/// Non-blank text. Numbers are rendered the way the spreadsheet showed them.
pub fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric value; accepts thousands separators in text cells (`"1,250.5"`).
pub fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Calendar date from ISO, US, German-style text, a datetime prefix, or an
/// Excel serial day number.
pub fn date(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            let day_part = s.split(['T', ' ']).next().unwrap_or(s);
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(day_part, fmt).ok())
        }
        Value::Number(n) => n.as_f64().and_then(excel_serial_date),
        _ => None,
    }
}

fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}

fn field_text(row: &Row, r: &dyn FieldResolver, field: Field) -> Option<String> {
    r.value(row, field).as_ref().and_then(text)
}

fn field_number(row: &Row, r: &dyn FieldResolver, field: Field) -> Option<f64> {
    r.value(row, field).as_ref().and_then(number)
}

fn field_date(row: &Row, r: &dyn FieldResolver, field: Field) -> Option<NaiveDate> {
    r.value(row, field).as_ref().and_then(date)
}

/// Trimmed, upper-cased work-center code.
pub fn work_center_code(raw: &str) -> Option<String> {
    let t = raw.trim();
    (!t.is_empty()).then(|| t.to_uppercase())
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_number: String,
    pub canonical: CanonicalId,
    pub title: Option<String>,
    pub status: Option<String>,
    pub work_center: Option<String>,
    pub customer: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
}

impl Job {
    /// `None` when the row has no job number.
    pub fn from_row(row: &Row, r: &dyn FieldResolver) -> Option<Self> {
        let job_number = field_text(row, r, Field::JobNumber)?;
        Some(Self {
            canonical: normalize(&job_number),
            job_number,
            title: field_text(row, r, Field::Title),
            status: field_text(row, r, Field::Status),
            work_center: field_text(row, r, Field::WorkCenter),
            customer: field_text(row, r, Field::Customer),
            due_date: field_date(row, r, Field::DueDate),
            scheduled_date: field_date(row, r, Field::ScheduledDate),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SapOperation {
    pub order_number: Option<String>,
    pub canonical: CanonicalId,
    pub operation_number: Option<String>,
    pub work_center: Option<String>,
    pub description: Option<String>,
    pub planned_work: f64,
    pub actual_work: f64,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

impl SapOperation {
    pub fn from_row(row: &Row, r: &dyn FieldResolver) -> Self {
        let order_number = field_text(row, r, Field::OrderNumber);
        Self {
            canonical: normalize_opt(order_number.as_deref()),
            order_number,
            operation_number: field_text(row, r, Field::OperationNumber),
            work_center: field_text(row, r, Field::WorkCenter).and_then(|w| work_center_code(&w)),
            description: field_text(row, r, Field::Description),
            planned_work: field_number(row, r, Field::PlannedWork).unwrap_or(0.0),
            actual_work: field_number(row, r, Field::ActualWork).unwrap_or(0.0),
            status: field_text(row, r, Field::Status),
            start_date: field_date(row, r, Field::StartDate),
            finish_date: field_date(row, r, Field::FinishDate),
        }
    }
}

/// Column the linker writes. Owned by the engine, never aliased.
pub const LINKED_JOB_COLUMN: &str = "job_number";

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOrder {
    /// Physical column + stored value of the purchasing document, for write-back.
    pub document_key: Option<(String, Value)>,
    pub purchasing_document: Option<String>,
    pub job_reference: Option<String>,
    /// Canonical link set by the linker; `None` while unlinked.
    pub job_number: Option<String>,
    pub vendor: Option<String>,
    pub material: Option<String>,
    pub order_quantity: Option<f64>,
    pub received_quantity: Option<f64>,
    pub document_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub status: Option<String>,
}

impl PurchaseOrder {
    pub fn from_row(row: &Row, r: &dyn FieldResolver) -> Self {
        let document_key = r.resolve(row, Field::PurchasingDocument);
        Self {
            purchasing_document: document_key.as_ref().and_then(|(_, v)| text(v)),
            document_key,
            job_reference: field_text(row, r, Field::JobReference),
            job_number: row.get(LINKED_JOB_COLUMN).and_then(text),
            vendor: field_text(row, r, Field::Vendor),
            material: field_text(row, r, Field::Material),
            order_quantity: field_number(row, r, Field::OrderQuantity),
            received_quantity: field_number(row, r, Field::ReceivedQuantity),
            document_date: field_date(row, r, Field::DocumentDate),
            delivery_date: field_date(row, r, Field::DeliveryDate),
            status: field_text(row, r, Field::Status),
        }
    }

    /// Raw job identifier as exported, falling back to an existing link.
    pub fn raw_job_id(&self) -> Option<&str> {
        self.job_reference.as_deref().or(self.job_number.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentLog {
    pub id: Option<String>,
    pub job_number: Option<String>,
    pub canonical: CanonicalId,
    pub vendor: Option<String>,
    pub shipment_date: Option<NaiveDate>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

impl ShipmentLog {
    pub fn from_row(row: &Row, r: &dyn FieldResolver) -> Self {
        let job_number = field_text(row, r, Field::JobNumber);
        Self {
            id: field_text(row, r, Field::ShipmentId),
            canonical: normalize_opt(job_number.as_deref()),
            job_number,
            vendor: field_text(row, r, Field::Vendor),
            shipment_date: field_date(row, r, Field::ShipmentDate),
            severity: field_text(row, r, Field::Severity),
            status: field_text(row, r, Field::Status),
            description: field_text(row, r, Field::Description),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorOpStatus {
    Planned,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorOperation {
    pub job_number: String,
    pub operation_number: String,
    pub vendor: String,
    pub vendor_name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: VendorOpStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkCenterKind {
    Internal,
    Vendor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkCenter {
    pub name: String,
    pub kind: WorkCenterKind,
    pub status: String,
    pub operation_count: i64,
    pub active_count: i64,
    pub utilization: f64,
}

/// Source of a timeline event. Declaration order is the tie-break precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    PurchaseOrder,
    Shipment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub job_number: String,
    pub event_date: NaiveDate,
    pub source: EventSource,
    pub source_id: String,
    pub sequence: i64,
    pub status: String,
    pub description: String,
    pub vendor: Option<String>,
}

/// Serialize a derived record into a store row.
pub fn to_row<T: Serialize>(record: &T) -> Row {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Row::new(),
    }
}

/// Parse store rows back into derived records. `None` if any row does not fit.
pub fn from_rows<T: for<'de> Deserialize<'de>>(rows: Vec<Row>) -> Option<Vec<T>> {
    rows.into_iter()
        .map(|r| serde_json::from_value(Value::Object(r)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_formats() {
        assert_eq!(date(&json!("2024-01-05")), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!("01/05/2024")), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!("05.01.2024")), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!("2024-01-05T08:30:00Z")), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!("2024-01-05 08:30")), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!(45296)), Some(ymd(2024, 1, 5)));
        assert_eq!(date(&json!("soon")), None);
        assert_eq!(date(&Value::Null), None);
    }

    #[test]
    fn numbers_and_text() {
        assert_eq!(number(&json!("1,250.5")), Some(1250.5));
        assert_eq!(number(&json!(3)), Some(3.0));
        assert_eq!(number(&json!("n/a")), None);
        assert_eq!(text(&json!("  x ")), Some("x".into()));
        assert_eq!(text(&json!("   ")), None);
        assert_eq!(text(&json!(100575126)), Some("100575126".into()));
    }

    #[test]
    fn sap_operation_from_aliased_row() {
        let aliases = AliasTable::default();
        let r = row(json!({
            "Sales Document": "100575126 ",
            "Operation": "0020",
            "Work Center": " sr",
            "Actual work": "2.5",
            "System Status": "REL PCNF",
        }));
        let op = SapOperation::from_row(&r, &aliases);
        assert_eq!(op.canonical, CanonicalId::Key("100575126".into()));
        assert_eq!(op.operation_number.as_deref(), Some("0020"));
        assert_eq!(op.work_center.as_deref(), Some("SR"));
        assert_eq!(op.actual_work, 2.5);
        assert_eq!(op.planned_work, 0.0);
    }

    #[test]
    fn job_requires_number() {
        let aliases = AliasTable::default();
        assert!(Job::from_row(&row(json!({"title": "Pump"})), &aliases).is_none());
        let job = Job::from_row(&row(json!({"Job": "J-1005", "Due Date": "2024-02-01"})), &aliases).unwrap();
        assert_eq!(job.canonical, CanonicalId::Key("J1005".into()));
        assert_eq!(job.due_date, Some(ymd(2024, 2, 1)));
    }

    #[test]
    fn purchase_order_keeps_document_key() {
        let aliases = AliasTable::default();
        let r = row(json!({"PO Number": 4500001, "Order": "100575126 ", "job_number": null}));
        let po = PurchaseOrder::from_row(&r, &aliases);
        assert_eq!(po.document_key, Some(("PO Number".into(), json!(4500001))));
        assert_eq!(po.purchasing_document.as_deref(), Some("4500001"));
        assert_eq!(po.raw_job_id(), Some("100575126"));
        assert_eq!(po.job_number, None);
    }

    #[test]
    fn derived_record_row_shape() {
        let wc = WorkCenter {
            name: "SR".into(),
            kind: WorkCenterKind::Vendor,
            status: "active".into(),
            operation_count: 2,
            active_count: 1,
            utilization: 0.5,
        };
        let r = to_row(&wc);
        assert_eq!(r["kind"], "vendor");
        assert_eq!(r["utilization"], 0.5);
        let back: Vec<WorkCenter> = from_rows(vec![r]).unwrap();
        assert_eq!(back, vec![wc]);
    }
}
