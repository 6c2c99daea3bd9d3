// User settings
// Loaded from ~/.config/shopfloor/settings.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the settings file location.
pub const SETTINGS_ENV: &str = "SHOPFLOOR_SETTINGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database path. None = `<data dir>/shopfloor/shopfloor.db`
    pub database: Option<PathBuf>,

    /// How long a write waits on a locked database before the step fails
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconSettings {
    /// Recon config used when `--config` is not given. None = built-in defaults
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter used when SHOPFLOOR_LOG is unset
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub recon: ReconSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopfloor")
            .join("settings.toml")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`. A missing file gives defaults; an unreadable or
    /// invalid one is logged and also gives defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("error parsing {}: {e}; using default settings", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("error reading {}: {e}; using default settings", path.display());
                Self::default()
            }
        }
    }

    /// Database path: explicit value (flag or SHOPFLOOR_DB), then settings, then default
    pub fn database_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.store.database.clone())
            .unwrap_or_else(default_database_path)
    }

    /// Recon config path: explicit value (flag or SHOPFLOOR_CONFIG), then settings
    pub fn recon_config_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        explicit.map(Path::to_path_buf).or_else(|| self.recon.config.clone())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shopfloor")
        .join("shopfloor.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.busy_timeout(), Duration::from_secs(5));
        assert_eq!(settings.log.filter, "info");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[store]\ndatabase = \"/srv/shop.db\"\n").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.store.database, Some(PathBuf::from("/srv/shop.db")));
        assert_eq!(settings.store.busy_timeout_ms, 5000);
    }

    #[test]
    fn invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[store\n").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn full_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = Settings::default();
        settings.recon.config = Some(PathBuf::from("plant.recon.toml"));
        settings.store.busy_timeout_ms = 250;
        fs::write(&path, toml::to_string_pretty(&settings).unwrap()).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn explicit_paths_win() {
        let mut settings = Settings::default();
        settings.store.database = Some(PathBuf::from("/from/settings.db"));
        assert_eq!(
            settings.database_path(Some(Path::new("/from/flag.db"))),
            PathBuf::from("/from/flag.db")
        );
        assert_eq!(settings.database_path(None), PathBuf::from("/from/settings.db"));
        settings.store.database = None;
        assert_eq!(settings.database_path(None), default_database_path());
        assert_eq!(settings.recon_config_path(None), None);
    }
}
