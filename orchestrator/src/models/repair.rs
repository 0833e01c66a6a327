//! Repair exchange models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::report::VerificationReport;

/// A failing check handed to the repair collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub method: String,
    pub endpoint: String,
    pub error_message: String,
}

/// Request for a repaired project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRequest {
    /// Correlation key; sent in the URL, not the body
    #[serde(skip)]
    pub project_id: String,

    pub attempt_number: u32,

    #[serde(rename = "failed_tests")]
    pub failed_checks: Vec<FailedCheck>,
}

impl RepairRequest {
    /// Build a request from every failed check of a report
    pub fn from_report(project_id: &str, attempt_number: u32, report: &VerificationReport) -> Self {
        let failed_checks = report
            .failed_checks()
            .map(|r| FailedCheck {
                method: r.method.clone(),
                endpoint: r.endpoint.clone(),
                error_message: r
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "check failed".to_string()),
            })
            .collect();

        Self {
            project_id: project_id.to_string(),
            attempt_number,
            failed_checks,
        }
    }
}

/// Reference to a freshly materialized project tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairResult {
    pub project_dir: PathBuf,

    /// Owned by the orchestrator; removed once superseded
    #[serde(default)]
    pub temporary: bool,
}
