//! Error types for the orchestrator

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("No composition descriptor found in {}", dir.display())]
    MissingManifest { dir: PathBuf },

    #[error("Default host port binding {port}:{port} not found in {}", file.display())]
    PortBindingNotFound { file: PathBuf, port: u16 },

    #[error("Build failed (exit code {exit_code:?})\n{output_tail}")]
    BuildFailed {
        exit_code: Option<i32>,
        output_tail: String,
    },

    #[error("Service at {url} not healthy after {attempts} attempts ({elapsed_ms}ms)")]
    HealthTimeout {
        url: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    #[error("Verification failed: {failed} of {total} checks failed")]
    VerificationFailed { failed: usize, total: usize },

    #[error("Repair unavailable: {0}")]
    RepairUnavailable(String),

    #[error("Attempts exhausted after {0} attempts")]
    AttemptsExhausted(u32),

    #[error("Deployment {0} is busy")]
    DeploymentBusy(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Container engine error: {0}")]
    EngineError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl OrchestratorError {
    /// Whether the retry/repair loop absorbs this error instead of surfacing it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::HealthTimeout { .. } | OrchestratorError::VerificationFailed { .. }
        )
    }

    /// Stable machine-readable kind, used in progress events and HTTP responses
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::IoError(_) => "io",
            OrchestratorError::JsonError(_) => "json",
            OrchestratorError::YamlError(_) => "yaml",
            OrchestratorError::HttpError(_) => "http",
            OrchestratorError::MissingManifest { .. } => "missing_manifest",
            OrchestratorError::PortBindingNotFound { .. } => "port_binding_not_found",
            OrchestratorError::BuildFailed { .. } => "build_failed",
            OrchestratorError::HealthTimeout { .. } => "health_timeout",
            OrchestratorError::VerificationFailed { .. } => "verification_failed",
            OrchestratorError::RepairUnavailable(_) => "repair_unavailable",
            OrchestratorError::AttemptsExhausted(_) => "attempts_exhausted",
            OrchestratorError::DeploymentBusy(_) => "deployment_busy",
            OrchestratorError::InvalidTransition(_) => "invalid_transition",
            OrchestratorError::EngineError(_) => "engine",
            OrchestratorError::ConfigError(_) => "config",
            OrchestratorError::ServerError(_) => "server",
            OrchestratorError::Cancelled(_) => "cancelled",
        }
    }
}
