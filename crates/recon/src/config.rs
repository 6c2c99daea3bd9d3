use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::alias::AliasTable;
use crate::error::ReconError;
use crate::model::work_center_code;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub vendor_work_centers: VendorWorkCentersConfig,
    /// Per-field alias overrides keyed by logical field name.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

fn default_name() -> String {
    "shopfloor".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            vendor_work_centers: VendorWorkCentersConfig::default(),
            aliases: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor work centers
// ---------------------------------------------------------------------------

/// Work-center codes that stand for outsourced operations.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorWorkCentersConfig {
    #[serde(default = "default_vendor_codes")]
    pub codes: Vec<String>,
    /// Optional display name per code (e.g. `SR = "Acme Ship & Repair"`).
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

fn default_vendor_codes() -> Vec<String> {
    vec!["SR".into(), "OSP".into()]
}

impl Default for VendorWorkCentersConfig {
    fn default() -> Self {
        Self {
            codes: default_vendor_codes(),
            names: BTreeMap::new(),
        }
    }
}

/// Normalized vendor work-center set used by the generators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorCenters {
    codes: BTreeSet<String>,
    names: BTreeMap<String, String>,
}

impl VendorCenters {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes.into_iter().filter_map(|c| work_center_code(c.as_ref())).collect(),
            names: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, code: &str, name: &str) -> Self {
        if let Some(code) = work_center_code(code) {
            self.names.insert(code, name.to_string());
        }
        self
    }

    pub fn contains(&self, work_center: &str) -> bool {
        work_center_code(work_center).is_some_and(|c| self.codes.contains(&c))
    }

    pub fn name(&self, work_center: &str) -> Option<&str> {
        work_center_code(work_center).and_then(|c| self.names.get(&c).map(|s| s.as_str()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        let mut seen = BTreeSet::new();
        for code in &self.vendor_work_centers.codes {
            let Some(normalized) = work_center_code(code) else {
                return Err(ReconError::ConfigValidation(
                    "vendor_work_centers.codes: empty code".into(),
                ));
            };
            if !seen.insert(normalized.clone()) {
                return Err(ReconError::ConfigValidation(format!(
                    "vendor_work_centers.codes: duplicate code '{normalized}'"
                )));
            }
        }

        for code in self.vendor_work_centers.names.keys() {
            let known = work_center_code(code).is_some_and(|c| seen.contains(&c));
            if !known {
                return Err(ReconError::ConfigValidation(format!(
                    "vendor_work_centers.names: '{code}' is not a configured vendor code"
                )));
            }
        }

        if seen.is_empty() {
            log::warn!("no vendor work centers configured; vendor operations will be empty");
        }

        AliasTable::with_overrides(&self.aliases)?;
        Ok(())
    }

    pub fn vendor_centers(&self) -> VendorCenters {
        let mut centers = VendorCenters::new(&self.vendor_work_centers.codes);
        for (code, name) in &self.vendor_work_centers.names {
            centers = centers.with_name(code, name);
        }
        centers
    }

    pub fn alias_table(&self) -> Result<AliasTable, ReconError> {
        AliasTable::with_overrides(&self.aliases)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
