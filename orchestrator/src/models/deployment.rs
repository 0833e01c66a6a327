//! Deployment models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentStatus};
use crate::errors::OrchestratorError;

/// One project's deployment, owned by the lifecycle manager
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Stable across attempts for the same generation
    pub project_id: String,

    /// Currently active source tree
    pub project_dir: Option<PathBuf>,

    /// Patched composition descriptor
    pub compose_file: Option<PathBuf>,

    /// Host port of the application after patching
    pub mapped_app_port: u16,

    /// Host port of the database after patching
    pub mapped_db_port: u16,

    fsm: DeploymentFsm,
}

impl Deployment {
    pub fn new(project_id: &str, mapped_app_port: u16, mapped_db_port: u16) -> Self {
        Self {
            project_id: project_id.to_string(),
            project_dir: None,
            compose_file: None,
            mapped_app_port,
            mapped_db_port,
            fsm: DeploymentFsm::new(),
        }
    }

    pub fn status(&self) -> DeploymentStatus {
        self.fsm.state()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.fsm.error()
    }

    /// Apply a status transition
    pub fn transition(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, OrchestratorError> {
        self.fsm
            .process(event)
            .map_err(|e| OrchestratorError::InvalidTransition(format!("{}: {}", self.project_id, e)))
    }

    /// Serializable view for listings
    pub fn snapshot(&self) -> DeploymentSnapshot {
        DeploymentSnapshot {
            project_id: self.project_id.clone(),
            project_dir: self.project_dir.clone(),
            mapped_app_port: self.mapped_app_port,
            mapped_db_port: self.mapped_db_port,
            status: self.status(),
            attempts: self.fsm.attempts(),
            last_error: self.fsm.error().map(str::to_string),
        }
    }
}

/// Point-in-time view of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub project_id: String,
    pub project_dir: Option<PathBuf>,
    pub mapped_app_port: u16,
    pub mapped_db_port: u16,
    pub status: DeploymentStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}
