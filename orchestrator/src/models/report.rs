//! Verification report models

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Outcome of a single smoke check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(rename = "test_name")]
    pub name: String,

    pub endpoint: String,

    pub method: String,

    pub passed: bool,

    pub status_code: Option<u16>,

    pub error_message: Option<String>,

    pub elapsed_ms: u64,
}

/// Outcome of one verifier run; one per attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,

    pub elapsed_ms: u64,

    pub results: Vec<CheckResult>,
}

impl VerificationReport {
    /// Build a report; `passed` is the AND over all results
    pub fn from_results(results: Vec<CheckResult>, elapsed_ms: u64) -> Self {
        Self {
            passed: results.iter().all(|r| r.passed),
            elapsed_ms,
            results,
        }
    }

    /// Checks that did not pass, in run order
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.failed_checks().count()
    }

    /// `VerificationFailed` unless every check passed
    pub fn verdict(&self) -> Result<(), OrchestratorError> {
        if self.passed {
            return Ok(());
        }
        Err(OrchestratorError::VerificationFailed {
            failed: self.failed_count(),
            total: self.results.len(),
        })
    }
}
