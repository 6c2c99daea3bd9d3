use std::time::Instant;

use serde::Serialize;

use crate::error::ReconError;

/// Result of a scoped full-replace write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceResult {
    /// Rows the scope holds after the call.
    pub count: usize,
    /// False when the scope already held exactly these rows and nothing was written.
    pub changed: bool,
}

impl ReplaceResult {
    pub fn merge(self, other: ReplaceResult) -> ReplaceResult {
        ReplaceResult {
            count: self.count + other.count,
            changed: self.changed || other.changed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Provision,
    PoLinks,
    VendorOps,
    WorkCenters,
    Timeline,
}

impl StepName {
    pub const ORDER: [StepName; 5] = [
        StepName::Provision,
        StepName::PoLinks,
        StepName::VendorOps,
        StepName::WorkCenters,
        StepName::Timeline,
    ];

    /// Label shown on the dashboard trigger's summary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Provision => "Schema",
            Self::PoLinks => "PO Links",
            Self::VendorOps => "Vendor Ops",
            Self::WorkCenters => "Work Centers",
            Self::Timeline => "Timeline",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision => write!(f, "provision"),
            Self::PoLinks => write!(f, "po_links"),
            Self::VendorOps => write!(f, "vendor_ops"),
            Self::WorkCenters => write!(f, "work_centers"),
            Self::Timeline => write!(f, "timeline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    NoChange,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success | Self::NoChange)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NoChange => "No change",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: StepName,
    pub label: &'static str,
    pub status: StepStatus,
    pub ok: bool,
    pub detail: String,
    /// Error kind when the step failed (`query_failure`, `write_failure`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub duration_ms: u64,
}

impl StepReport {
    pub fn new(name: StepName, status: StepStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            label: name.label(),
            status,
            ok: status.is_ok(),
            detail: detail.into(),
            error_kind: None,
            duration_ms: 0,
        }
    }

    pub fn failed(name: StepName, err: &ReconError) -> Self {
        let mut step = Self::new(name, StepStatus::Failed, err.to_string());
        step.error_kind = Some(err.kind());
        step
    }

    pub fn skipped(name: StepName, reason: impl Into<String>) -> Self {
        Self::new(name, StepStatus::Skipped, reason)
    }

    pub fn timed(mut self, start: Instant) -> Self {
        self.duration_ms = start.elapsed().as_millis() as u64;
        self
    }

    /// "PO Links: Success (1 linked, 4 already linked, 0 unmatched)"
    pub fn summary_line(&self) -> String {
        if self.detail.is_empty() {
            format!("{}: {}", self.label, self.status.label())
        } else {
            format!("{}: {} ({})", self.label, self.status.label(), self.detail)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every step succeeded or had nothing to change.
    Ok,
    /// At least one step failed or was skipped.
    Partial,
    /// Provisioning failed; no derived data was touched.
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub verdict: Verdict,
    pub aborted: bool,
    pub steps: Vec<StepReport>,
    /// SHA-256 over all derived tables after the run. `None` if they could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Report {
    pub fn from_steps(config_name: &str, steps: Vec<StepReport>, digest: Option<String>) -> Self {
        let aborted = steps
            .iter()
            .any(|s| s.name == StepName::Provision && s.status == StepStatus::Failed);
        let verdict = if aborted {
            Verdict::Aborted
        } else if steps.iter().all(|s| s.ok) {
            Verdict::Ok
        } else {
            Verdict::Partial
        };
        Self {
            config_name: config_name.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            verdict,
            aborted,
            steps,
            digest,
        }
    }

    pub fn step(&self, name: StepName) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_ok(&self) -> bool {
        self.verdict == Verdict::Ok
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.steps.iter().map(StepReport::summary_line).collect()
    }
}
