// Storage and import for the reconciliation engine

pub mod import;
pub mod sqlite;

pub use import::{CsvImporter, ImportSummary, RawTable};
pub use sqlite::SqliteStore;
