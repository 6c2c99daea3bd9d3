//! `shopfloor import` - load a raw CSV export into its table.

use std::path::Path;

use shopfloor_io::{CsvImporter, RawTable};

use crate::{to_json, CliError, Context};

pub fn cmd_import(ctx: &Context, kind: RawTable, file: &Path, json_output: bool) -> Result<(), CliError> {
    if !file.exists() {
        return Err(CliError::usage(format!("file not found: {}", file.display())));
    }

    let config = ctx.recon_config()?;
    let aliases = config.alias_table().map_err(CliError::recon)?;
    let store = ctx.open_store()?;

    let summary = CsvImporter::new(&store, &aliases)
        .import_path(kind, file)
        .map_err(CliError::recon)?;

    if json_output {
        println!("{}", to_json(&summary)?);
    } else {
        eprintln!(
            "imported {} row(s) into {} (key: {}){}",
            summary.rows,
            summary.table,
            summary.key_columns.join(", "),
            if summary.skipped > 0 {
                format!(", {} skipped with a blank key", summary.skipped)
            } else {
                String::new()
            },
        );
    }
    Ok(())
}
