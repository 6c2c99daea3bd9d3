// Shopfloor CLI - reconcile imported job, SAP, purchase-order and shipment data

mod exit_codes;
mod import;
mod reconcile;
mod settings_cmd;
mod timeline;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt::Subscriber, prelude::*, EnvFilter};

use shopfloor_config::Settings;
use shopfloor_io::{RawTable, SqliteStore};
use shopfloor_recon::{ReconConfig, ReconError, StoreError};

use exit_codes::{recon_exit_code, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME, EXIT_SUCCESS, EXIT_USAGE};

/// Log filter override, e.g. `SHOPFLOOR_LOG=shopfloor_recon=debug`.
const LOG_ENV: &str = "SHOPFLOOR_LOG";

#[derive(Parser)]
#[command(name = "shopfloor")]
#[command(about = "Link purchase orders to jobs and rebuild vendor operations, work centers and job timelines")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// SQLite database (defaults to the settings file, then the data directory)
    #[arg(long, global = true, env = "SHOPFLOOR_DB")]
    db: Option<PathBuf>,

    /// Recon config TOML (vendor work centers, column aliases)
    #[arg(long, global = true, env = "SHOPFLOOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every reconciliation step against the database
    #[command(after_help = "\
Examples:
  shopfloor reconcile
  shopfloor reconcile --json
  shopfloor reconcile --config plant.recon.toml --output report.json
  shopfloor reconcile --dry-run")]
    Reconcile {
        /// Output the JSON report to stdout instead of only the human summary
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Run against an in-memory copy; the database is left untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Import a raw CSV export into the database
    #[command(after_help = "\
Examples:
  shopfloor import jobs jobs.csv
  shopfloor import sap-operations IW37N.csv
  shopfloor import purchase-orders ME2N.csv --json")]
    Import {
        /// Target table: jobs, sap-operations, purchase-orders, shipment-logs
        table: RawTable,

        /// CSV file (delimiter and encoding are detected)
        file: PathBuf,

        /// Output the import summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the derived timeline of one job
    #[command(after_help = "\
Examples:
  shopfloor timeline 100575126
  shopfloor timeline j-1005 --json")]
    Timeline {
        /// Job number in any spelling (case, separators and padding are ignored)
        job: String,

        /// Output events as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row counts and the derived-data digest
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect settings and recon configs
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  shopfloor config validate plant.recon.toml")]
    Validate {
        /// Path to the recon config TOML
        file: PathBuf,
    },

    /// Show effective settings and where each value came from
    Show,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  shopfloor-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

/// Install the stderr subscriber. `log` records from the library crates are
/// forwarded through the subscriber's log bridge.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .finish()
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::load();
    init_tracing(&settings.log.filter);

    let ctx = Context { settings, db: cli.db, config: cli.config };

    let result = match cli.command {
        Commands::Reconcile { json, output, dry_run } => reconcile::cmd_reconcile(&ctx, json, output, dry_run),
        Commands::Import { table, file, json } => import::cmd_import(&ctx, table, &file, json),
        Commands::Timeline { job, json } => timeline::cmd_timeline(&ctx, &job, json),
        Commands::Status { json } => reconcile::cmd_status(&ctx, json),
        Commands::Config { command } => match command {
            ConfigCommands::Validate { file } => settings_cmd::cmd_config_validate(&file),
            ConfigCommands::Show => settings_cmd::cmd_config_show(&ctx),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Global flags resolved against the settings file.
pub struct Context {
    pub settings: Settings,
    db: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl Context {
    pub fn database_path(&self) -> PathBuf {
        self.settings.database_path(self.db.as_deref())
    }

    pub fn recon_config_path(&self) -> Option<PathBuf> {
        self.settings.recon_config_path(self.config.as_deref())
    }

    /// Open the database, creating its directory on first use.
    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        let path = self.database_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CliError::runtime(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        SqliteStore::open(&path, self.settings.busy_timeout())
            .map_err(|e| CliError::store(&path, e))
    }

    /// The recon config in effect: `--config`, then settings, then built-in defaults.
    pub fn recon_config(&self) -> Result<ReconConfig, CliError> {
        match self.recon_config_path() {
            Some(path) => load_recon_config(&path),
            None => Ok(ReconConfig::default()),
        }
    }
}

pub fn load_recon_config(path: &Path) -> Result<ReconConfig, CliError> {
    ReconConfig::from_file(path).map_err(|e| {
        let code = match &e {
            ReconError::Io(_) => EXIT_RECON_INVALID_CONFIG,
            other => recon_exit_code(other),
        };
        CliError { code, message: e.to_string(), hint: None }
            .with_hint(format!("check {} with `shopfloor config validate`", path.display()))
    })
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RECON_RUNTIME, message: msg.into(), hint: None }
    }

    /// Create error from a recon error with the registry's exit code.
    pub fn recon(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MissingColumn { field, .. } => {
                Some(format!("add a column alias for '{field}' under [aliases] in the recon config"))
            }
            ReconError::WriteFailure { source: StoreError::Timeout(_), .. }
            | ReconError::QueryFailure { source: StoreError::Timeout(_), .. } => {
                Some("another process holds the database lock; retry later".to_string())
            }
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn store(path: &Path, err: StoreError) -> Self {
        Self::runtime(format!("cannot open {}: {err}", path.display()))
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Write `json` to `output` and/or stdout.
pub fn emit_json(json: &str, to_stdout: bool, output: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output {
        std::fs::write(path, json)
            .map_err(|e| CliError::runtime(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }
    if to_stdout {
        println!("{json}");
    }
    Ok(())
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))
}
