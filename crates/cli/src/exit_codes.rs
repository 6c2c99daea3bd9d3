//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `shopfloor` exit codes.
//! The dashboard trigger and cron wrappers branch on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | reconcile        | Run verdicts, config and store failures  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `recon_exit_code` or the command's error handling

use shopfloor_recon::{ReconError, Verdict};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, blank job id.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Reconcile (60-69)
// =============================================================================

/// Run finished but at least one step failed or was skipped.
pub const EXIT_RECON_PARTIAL: u8 = 60;

/// Schema provisioning failed; no derived table was touched.
pub const EXIT_RECON_ABORTED: u8 = 61;

/// Recon config could not be read, parsed or validated.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 62;

/// Store or filesystem failure outside a step (open database, write output).
pub const EXIT_RECON_RUNTIME: u8 = 63;

/// An import file was rejected (missing key column, malformed CSV).
pub const EXIT_RECON_IMPORT: u8 = 64;

// =============================================================================
// Mapping
// =============================================================================

/// Exit code for a finished run.
pub fn verdict_exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Ok => EXIT_SUCCESS,
        Verdict::Partial => EXIT_RECON_PARTIAL,
        Verdict::Aborted => EXIT_RECON_ABORTED,
    }
}

/// Map a ReconError to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::MissingColumn { .. } | ReconError::Import { .. } => EXIT_RECON_IMPORT,
        ReconError::ProvisionFailure { .. } => EXIT_RECON_ABORTED,
        ReconError::QueryFailure { .. } | ReconError::WriteFailure { .. } | ReconError::Io(_) => {
            EXIT_RECON_RUNTIME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_recon::StoreError;

    #[test]
    fn verdicts_map_to_distinct_codes() {
        assert_eq!(verdict_exit_code(Verdict::Ok), 0);
        assert_eq!(verdict_exit_code(Verdict::Partial), 60);
        assert_eq!(verdict_exit_code(Verdict::Aborted), 61);
    }

    #[test]
    fn error_kinds() {
        assert_eq!(recon_exit_code(&ReconError::ConfigParse("x".into())), EXIT_RECON_INVALID_CONFIG);
        assert_eq!(
            recon_exit_code(&ReconError::MissingColumn { table: "jobs".into(), field: "job_number".into() }),
            EXIT_RECON_IMPORT
        );
        assert_eq!(
            recon_exit_code(&ReconError::write("jobs", StoreError::Timeout("locked".into()))),
            EXIT_RECON_RUNTIME
        );
    }
}
