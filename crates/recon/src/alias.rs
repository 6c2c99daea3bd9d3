//! Column-alias resolution for raw import rows.
//!
//! Each raw source names its columns differently ("Order", "Sales Document",
//! "order_number", ...). The engine reads raw rows only through a
//! [`FieldResolver`], so generator code never sees a physical column name.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::ReconError;
use crate::store::Row;

/// Logical fields of the raw tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    // Job
    JobNumber,
    Title,
    Status,
    WorkCenter,
    Customer,
    DueDate,
    ScheduledDate,
    // SAP operation
    OrderNumber,
    OperationNumber,
    Description,
    PlannedWork,
    ActualWork,
    StartDate,
    FinishDate,
    // Purchase order
    PurchasingDocument,
    JobReference,
    Vendor,
    Material,
    OrderQuantity,
    ReceivedQuantity,
    DocumentDate,
    DeliveryDate,
    // Shipment log
    ShipmentId,
    ShipmentDate,
    Severity,
}

impl Field {
    pub const ALL: [Field; 25] = [
        Field::JobNumber,
        Field::Title,
        Field::Status,
        Field::WorkCenter,
        Field::Customer,
        Field::DueDate,
        Field::ScheduledDate,
        Field::OrderNumber,
        Field::OperationNumber,
        Field::Description,
        Field::PlannedWork,
        Field::ActualWork,
        Field::StartDate,
        Field::FinishDate,
        Field::PurchasingDocument,
        Field::JobReference,
        Field::Vendor,
        Field::Material,
        Field::OrderQuantity,
        Field::ReceivedQuantity,
        Field::DocumentDate,
        Field::DeliveryDate,
        Field::ShipmentId,
        Field::ShipmentDate,
        Field::Severity,
    ];

    /// Column name used when the import layer writes the field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobNumber => "job_number",
            Self::Title => "title",
            Self::Status => "status",
            Self::WorkCenter => "work_center",
            Self::Customer => "customer",
            Self::DueDate => "due_date",
            Self::ScheduledDate => "scheduled_date",
            Self::OrderNumber => "order_number",
            Self::OperationNumber => "operation_number",
            Self::Description => "description",
            Self::PlannedWork => "planned_work",
            Self::ActualWork => "actual_work",
            Self::StartDate => "start_date",
            Self::FinishDate => "finish_date",
            Self::PurchasingDocument => "purchasing_document",
            Self::JobReference => "job_reference",
            Self::Vendor => "vendor",
            Self::Material => "material",
            Self::OrderQuantity => "order_quantity",
            Self::ReceivedQuantity => "received_quantity",
            Self::DocumentDate => "document_date",
            Self::DeliveryDate => "delivery_date",
            Self::ShipmentId => "id",
            Self::ShipmentDate => "shipment_date",
            Self::Severity => "severity",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Built-in aliases, most specific first. The logical name is always first.
    fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::JobNumber => &["job_number", "Job", "Job Number", "Job No", "Job #"],
            Self::Title => &["title", "Title", "Job Title", "Part Description"],
            Self::Status => &["status", "Status", "System Status", "Order Status"],
            Self::WorkCenter => &["work_center", "Work Center", "Work Ctr", "WorkCenter"],
            Self::Customer => &["customer", "Customer", "Sold-to party", "Customer Name"],
            Self::DueDate => &["due_date", "Due Date", "Requested Delivery Date", "Basic finish date"],
            Self::ScheduledDate => &["scheduled_date", "Scheduled Date", "Scheduled start", "Basic start date"],
            Self::OrderNumber => &["order_number", "Order", "Sales Document", "Sales Order"],
            Self::OperationNumber => &["operation_number", "Operation", "Oper./Act.", "Activity"],
            Self::Description => &["description", "Description", "Operation short text", "Operation Text", "Notes"],
            Self::PlannedWork => &["planned_work", "Work", "Planned Work"],
            Self::ActualWork => &["actual_work", "Actual work", "Actual Work"],
            Self::StartDate => &["start_date", "Earl. start date", "Earliest start date", "Start Date"],
            Self::FinishDate => &["finish_date", "Lat. finish date", "Latest finish date", "Finish Date", "End Date"],
            Self::PurchasingDocument => &["purchasing_document", "Purchasing Document", "PO Number", "PO"],
            Self::JobReference => &["job_reference", "Order", "Sales Document", "Sales Order", "Job", "job_number_raw"],
            Self::Vendor => &["vendor", "Vendor", "Supplier", "Vendor Name", "Carrier"],
            Self::Material => &["material", "Material", "Part Number", "Material Number"],
            Self::OrderQuantity => &["order_quantity", "Order Quantity", "PO Quantity", "Qty"],
            Self::ReceivedQuantity => &["received_quantity", "Quantity Received", "Received Qty", "Delivered Quantity"],
            Self::DocumentDate => &["document_date", "Document Date", "PO Date", "Doc. Date"],
            Self::DeliveryDate => &["delivery_date", "Delivery Date", "Delivery date"],
            Self::ShipmentId => &["id", "ID", "Shipment ID", "Log ID"],
            Self::ShipmentDate => &["shipment_date", "Ship Date", "Shipment Date", "Date"],
            Self::Severity => &["severity", "Severity", "Priority"],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolves a logical field on a raw row to `(physical column, value)`.
///
/// Supplied by the import layer. `AliasTable` is the standard implementation;
/// any `Fn(&Row, Field) -> Option<(String, Value)>` works too.
pub trait FieldResolver {
    fn resolve(&self, row: &Row, field: Field) -> Option<(String, Value)>;

    fn value(&self, row: &Row, field: Field) -> Option<Value> {
        self.resolve(row, field).map(|(_, v)| v)
    }
}

impl<F> FieldResolver for F
where
    F: Fn(&Row, Field) -> Option<(String, Value)>,
{
    fn resolve(&self, row: &Row, field: Field) -> Option<(String, Value)> {
        self(row, field)
    }
}

/// Ordered alias list per logical field.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTable {
    aliases: BTreeMap<Field, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let aliases = Field::ALL
            .iter()
            .map(|f| (*f, f.default_aliases().iter().map(|s| s.to_string()).collect()))
            .collect();
        Self { aliases }
    }
}

impl AliasTable {
    /// Defaults with per-field overrides keyed by logical name.
    /// An override replaces the field's alias list; the logical name stays first.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self, ReconError> {
        let mut table = Self::default();
        for (name, list) in overrides {
            let field = Field::from_name(name).ok_or_else(|| {
                ReconError::ConfigValidation(format!("aliases: unknown field '{name}'"))
            })?;
            if list.iter().any(|a| a.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "aliases.{name}: empty alias"
                )));
            }
            table.set(field, list.clone());
        }
        Ok(table)
    }

    pub fn set(&mut self, field: Field, list: Vec<String>) {
        let mut out = vec![field.name().to_string()];
        for alias in list {
            if !out.contains(&alias) {
                out.push(alias);
            }
        }
        self.aliases.insert(field, out);
    }

    pub fn aliases(&self, field: Field) -> &[String] {
        self.aliases.get(&field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Index of the header that supplies `field`: exact match first, then a
    /// case-insensitive match on trimmed headers.
    pub fn header_index(&self, headers: &[String], field: Field) -> Option<usize> {
        let aliases = self.aliases(field);
        for alias in aliases {
            if let Some(i) = headers.iter().position(|h| h == alias) {
                return Some(i);
            }
        }
        for alias in aliases {
            if let Some(i) = headers.iter().position(|h| h.trim().eq_ignore_ascii_case(alias)) {
                return Some(i);
            }
        }
        None
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl FieldResolver for AliasTable {
    /// First alias (in order) whose column holds a non-blank value.
    fn resolve(&self, row: &Row, field: Field) -> Option<(String, Value)> {
        let aliases = self.aliases(field);
        let exact = aliases.iter().find_map(|a| {
            row.get(a.as_str())
                .filter(|v| !is_blank(v))
                .map(|v| (a.clone(), v.clone()))
        });
        if exact.is_some() {
            return exact;
        }
        aliases.iter().find_map(|a| {
            row.iter()
                .find(|(col, v)| col.trim().eq_ignore_ascii_case(a) && !is_blank(v))
                .map(|(col, v)| (col.clone(), v.clone()))
        })
    }
}
