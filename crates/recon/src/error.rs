use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ReconError {
    /// A derived table could not be created. Fatal for the whole run.
    #[error("cannot provision table '{table}': {source}")]
    ProvisionFailure {
        table: String,
        #[source]
        source: StoreError,
    },
    /// Reading a table failed; the step that issued the read is marked failed.
    #[error("query on '{table}' failed: {source}")]
    QueryFailure {
        table: String,
        #[source]
        source: StoreError,
    },
    /// Writing a table failed. Earlier writes of the same step may have committed.
    #[error("write to '{table}' failed: {source}")]
    WriteFailure {
        table: String,
        #[source]
        source: StoreError,
    },
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (empty alias, duplicate vendor code, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// An import file lacks a column for a required field.
    #[error("table '{table}': no column found for required field '{field}'")]
    MissingColumn { table: String, field: String },
    /// An import row could not be ingested.
    #[error("import into '{table}', line {line}: {message}")]
    Import {
        table: String,
        line: u64,
        message: String,
    },
    /// IO error (file read, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl ReconError {
    pub fn query(table: &str, source: StoreError) -> Self {
        Self::QueryFailure { table: table.to_string(), source }
    }

    pub fn write(table: &str, source: StoreError) -> Self {
        Self::WriteFailure { table: table.to_string(), source }
    }

    /// Short machine-friendly name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProvisionFailure { .. } => "provision_failure",
            Self::QueryFailure { .. } => "query_failure",
            Self::WriteFailure { .. } => "write_failure",
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigValidation(_) => "config_validation",
            Self::MissingColumn { .. } => "missing_column",
            Self::Import { .. } => "import",
            Self::Io(_) => "io",
        }
    }
}
