// CSV import of raw exports into the store

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use shopfloor_recon::model::LINKED_JOB_COLUMN;
use shopfloor_recon::schema::{JOBS, PURCHASE_ORDERS, SAP_OPERATIONS, SHIPMENT_LOGS};
use shopfloor_recon::{AliasTable, ColumnSpec, ColumnType, Field, ReconError, Row, Store};

/// Where an exported `job_number` column on purchase orders is kept. The
/// `job_number` column itself belongs to the linker.
pub const PO_RAW_JOB_COLUMN: &str = "job_number_raw";

/// The raw tables an export can be imported into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTable {
    Jobs,
    SapOperations,
    PurchaseOrders,
    ShipmentLogs,
}

impl RawTable {
    pub const ALL: [RawTable; 4] = [
        RawTable::Jobs,
        RawTable::SapOperations,
        RawTable::PurchaseOrders,
        RawTable::ShipmentLogs,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Jobs => JOBS,
            Self::SapOperations => SAP_OPERATIONS,
            Self::PurchaseOrders => PURCHASE_ORDERS,
            Self::ShipmentLogs => SHIPMENT_LOGS,
        }
    }

    /// Logical fields forming the natural key. Re-imports upsert on them.
    pub fn key_fields(&self) -> &'static [Field] {
        match self {
            Self::Jobs => &[Field::JobNumber],
            Self::SapOperations => &[Field::OrderNumber, Field::OperationNumber],
            Self::PurchaseOrders => &[Field::PurchasingDocument],
            Self::ShipmentLogs => &[Field::ShipmentId],
        }
    }

    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::SapOperations => "sap-operations",
            Self::PurchaseOrders => "purchase-orders",
            Self::ShipmentLogs => "shipment-logs",
        }
    }
}

impl fmt::Display for RawTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for RawTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        RawTable::ALL
            .into_iter()
            .find(|t| t.cli_name() == wanted)
            .ok_or_else(|| {
                format!("unknown table '{s}' (expected jobs, sap-operations, purchase-orders or shipment-logs)")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub table: &'static str,
    /// Rows upserted.
    pub rows: usize,
    /// Rows skipped because a key cell was blank.
    pub skipped: usize,
    /// Physical columns backing the natural key.
    pub key_columns: Vec<String>,
}

pub struct CsvImporter<'a> {
    store: &'a dyn Store,
    aliases: &'a AliasTable,
}

impl<'a> CsvImporter<'a> {
    pub fn new(store: &'a dyn Store, aliases: &'a AliasTable) -> Self {
        Self { store, aliases }
    }

    pub fn import_path(&self, kind: RawTable, path: &Path) -> Result<ImportSummary, ReconError> {
        let content = read_file_as_utf8(path)
            .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
        self.import_str(kind, &content)
    }

    pub fn import_str(&self, kind: RawTable, content: &str) -> Result<ImportSummary, ReconError> {
        let table = kind.table();
        let content = content.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sniff_delimiter(content))
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| ReconError::Import { table: table.into(), line: 1, message: e.to_string() })?;
        let headers = physical_headers(kind, headers.iter());

        let mut key_idx = Vec::new();
        for field in kind.key_fields() {
            let idx = self.aliases.header_index(&headers, *field).ok_or_else(|| {
                ReconError::MissingColumn { table: table.into(), field: field.name().into() }
            })?;
            key_idx.push(idx);
        }
        let key_columns: Vec<String> = key_idx.iter().map(|i| headers[*i].clone()).collect();

        let mut rows = Vec::new();
        let mut skipped = 0;
        for result in reader.records() {
            let record = result.map_err(|e| ReconError::Import {
                table: table.into(),
                line: e.position().map(|p| p.line()).unwrap_or(0),
                message: e.to_string(),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if key_idx.iter().any(|i| record.get(*i).map_or(true, |v| v.trim().is_empty())) {
                log::warn!("{table} line {line}: blank key cell, row skipped");
                skipped += 1;
                continue;
            }

            let mut row = Row::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                if header.is_empty() || row.contains_key(header) {
                    continue;
                }
                let cell = cell.trim();
                let value = if cell.is_empty() { Value::Null } else { Value::String(cell.to_string()) };
                row.insert(header.clone(), value);
            }
            rows.push(row);
        }

        let columns: Vec<ColumnSpec> = unique_headers(&headers)
            .map(|h| ColumnSpec::dynamic(h, ColumnType::Text, key_columns.iter().any(|k| k == h)))
            .collect();
        self.store
            .ensure_table(table, &columns)
            .map_err(|source| ReconError::ProvisionFailure { table: table.into(), source })?;

        let conflict: Vec<&str> = key_columns.iter().map(String::as_str).collect();
        self.store
            .upsert(table, &rows, &conflict)
            .map_err(|e| ReconError::write(table, e))?;

        log::info!("imported {} row(s) into {table} ({skipped} skipped)", rows.len());
        Ok(ImportSummary { table, rows: rows.len(), skipped, key_columns })
    }
}

/// Trimmed headers. On purchase orders an exported `job_number` is moved aside.
fn physical_headers<'r>(kind: RawTable, raw: impl Iterator<Item = &'r str>) -> Vec<String> {
    raw.map(|h| {
        let h = h.trim();
        if kind == RawTable::PurchaseOrders && h == LINKED_JOB_COLUMN {
            PO_RAW_JOB_COLUMN.to_string()
        } else {
            h.to_string()
        }
    })
    .collect()
}

fn unique_headers(headers: &[String]) -> impl Iterator<Item = &String> {
    headers
        .iter()
        .enumerate()
        .filter(|(i, h)| !h.is_empty() && !headers[..*i].contains(*h))
        .map(|(_, h)| h)
}

/// Delimiters tried on an export, in tie-break order. SAP list exports use
/// `;`, so it wins when two candidates split the sample equally well.
const DELIMITERS: [u8; 4] = [b';', b'\t', b',', b'|'];

/// Lines of the export inspected when picking the delimiter.
const SNIFF_LINES: usize = 10;

/// Pick the delimiter that splits the header and the sampled rows into the
/// same number of fields. Comma when nothing splits the header.
fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(SNIFF_LINES).collect();
    let Some((header, rows)) = sample.split_first() else {
        return b',';
    };

    let mut best = (b',', 0usize);
    for delim in DELIMITERS {
        let columns = field_count(header, delim);
        if columns <= 1 {
            continue;
        }
        let agreeing = 1 + rows.iter().filter(|line| field_count(line, delim) == columns).count();
        let score = agreeing * columns;
        if score > best.1 {
            best = (delim, score);
        }
    }
    best.0
}

fn field_count(line: &str, delim: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |r| r.len())
}

/// Read file and convert to UTF-8 if needed (SAP and Excel exports are often Windows-1252).
pub fn read_file_as_utf8(path: &Path) -> Result<String, std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_recon::MemoryStore;

    #[test]
    fn parse_table_names() {
        assert_eq!("sap-operations".parse::<RawTable>().unwrap(), RawTable::SapOperations);
        assert_eq!("purchase_orders".parse::<RawTable>().unwrap(), RawTable::PurchaseOrders);
        assert!("invoices".parse::<RawTable>().is_err());
    }

    #[test]
    fn sniff_semicolon_delimiter() {
        assert_eq!(sniff_delimiter("Order;Operation;Work Center\n1;0010;SR\n"), b';');
        assert_eq!(sniff_delimiter("Order,Operation\n1,0010\n"), b',');
        assert_eq!(sniff_delimiter("Order\tOperation\n1\t0010\n"), b'\t');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn semicolon_wins_a_tie() {
        // German SAP exports: `;` between fields, `,` as the decimal mark
        let content = "Order;Qty,Unit\n100575126;2,5\n";
        assert_eq!(sniff_delimiter(content), b';');
        // Splits evenly on `;` and on tab
        let content = "Order;Short text\tLong text\n100575126;Weld\tWeld and grind\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn import_resolves_aliases_and_upserts() {
        let store = MemoryStore::new();
        let aliases = AliasTable::default();
        let importer = CsvImporter::new(&store, &aliases);

        let csv = "Sales Document;Operation;Work Center\n100575126;0010;DNI\n100575126;0020;SR\n";
        let summary = importer.import_str(RawTable::SapOperations, csv).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.key_columns, vec!["Sales Document", "Operation"]);

        let again = "Sales Document;Operation;Work Center\n100575126;0020;OSP\n";
        importer.import_str(RawTable::SapOperations, again).unwrap();
        let rows = store.rows(SAP_OPERATIONS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["Work Center"], "OSP");
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let store = MemoryStore::new();
        let aliases = AliasTable::default();
        let err = CsvImporter::new(&store, &aliases)
            .import_str(RawTable::Jobs, "Title,Customer\nPump,Northwind\n")
            .unwrap_err();
        assert_eq!(err.kind(), "missing_column");
        assert!(!store.has_table(JOBS));
    }

    #[test]
    fn blank_keys_are_skipped() {
        let store = MemoryStore::new();
        let aliases = AliasTable::default();
        let summary = CsvImporter::new(&store, &aliases)
            .import_str(RawTable::Jobs, "Job Number,Title\n100575126,Pump\n ,Orphan\n")
            .unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn exported_job_number_on_orders_is_moved_aside() {
        let store = MemoryStore::new();
        let aliases = AliasTable::default();
        CsvImporter::new(&store, &aliases)
            .import_str(RawTable::PurchaseOrders, "purchasing_document,job_number\n4500001,J-1\n")
            .unwrap();
        let rows = store.rows(PURCHASE_ORDERS);
        assert_eq!(rows[0][PO_RAW_JOB_COLUMN], "J-1");
        assert!(rows[0].get(LINKED_JOB_COLUMN).is_none());
    }

    #[test]
    fn windows_1252_files_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        // "Müller" in Windows-1252
        std::fs::write(&path, b"Job Number,Customer\n1,M\xfcller\n").unwrap();
        let store = MemoryStore::new();
        let aliases = AliasTable::default();
        CsvImporter::new(&store, &aliases).import_path(RawTable::Jobs, &path).unwrap();
        assert_eq!(store.rows(JOBS)[0]["Customer"], "Müller");
    }
}
