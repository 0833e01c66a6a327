//! Contracts with the external collaborators of the repair loop

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::repair::{RepairRequest, RepairResult};
use crate::models::report::VerificationReport;

/// Produces a revised project from failing-check evidence
#[async_trait]
pub trait RepairCollaborator: Send + Sync {
    async fn repair(&self, request: &RepairRequest) -> Result<RepairResult, OrchestratorError>;
}

/// Receives every verification report
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn submit(&self, project_id: &str, report: &VerificationReport) -> Result<(), OrchestratorError>;
}

/// Stand-in when no backend is configured: repairs fail, evidence is dropped
#[derive(Debug, Clone, Default)]
pub struct Offline;

#[async_trait]
impl RepairCollaborator for Offline {
    async fn repair(&self, request: &RepairRequest) -> Result<RepairResult, OrchestratorError> {
        Err(OrchestratorError::RepairUnavailable(format!(
            "no repair backend configured for {}",
            request.project_id
        )))
    }
}

#[async_trait]
impl EvidenceSink for Offline {
    async fn submit(&self, _project_id: &str, _report: &VerificationReport) -> Result<(), OrchestratorError> {
        Ok(())
    }
}
