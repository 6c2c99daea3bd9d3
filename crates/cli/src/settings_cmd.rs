//! `shopfloor config validate` / `shopfloor config show`.

use std::path::Path;

use shopfloor_config::Settings;

use crate::{load_recon_config, CliError, Context};

pub fn cmd_config_validate(file: &Path) -> Result<(), CliError> {
    let config = load_recon_config(file)?;
    let vendors = config.vendor_centers();
    let codes: Vec<&str> = vendors.codes().collect();
    eprintln!(
        "valid: recon config '{}' with {} vendor work center(s) [{}], {} alias override(s)",
        config.name,
        codes.len(),
        codes.join(", "),
        config.aliases.len(),
    );
    Ok(())
}

pub fn cmd_config_show(ctx: &Context) -> Result<(), CliError> {
    let db_source = if ctx.db.is_some() {
        "flag/env"
    } else if ctx.settings.store.database.is_some() {
        "settings"
    } else {
        "default"
    };
    let config_source = if ctx.config.is_some() {
        "flag/env"
    } else if ctx.settings.recon.config.is_some() {
        "settings"
    } else {
        "built-in"
    };

    println!("settings file: {}", Settings::config_path_display());
    println!("database:      {} ({db_source})", ctx.database_path().display());
    match ctx.recon_config_path() {
        Some(path) => println!("recon config:  {} ({config_source})", path.display()),
        None => println!("recon config:  built-in defaults"),
    }
    println!("busy timeout:  {}ms", ctx.settings.store.busy_timeout_ms);
    println!("log filter:    {}", ctx.settings.log.filter);

    let config = ctx.recon_config()?;
    let vendors = config.vendor_centers();
    for code in vendors.codes() {
        match vendors.name(code) {
            Some(name) => println!("vendor:        {code} = {name}"),
            None => println!("vendor:        {code}"),
        }
    }

    let text = toml::to_string_pretty(&ctx.settings)
        .map_err(|e| CliError::runtime(format!("cannot render settings: {e}")))?;
    println!();
    print!("{text}");
    Ok(())
}
