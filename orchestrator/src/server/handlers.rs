//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentSnapshot;
use crate::orchestrate::{VerifyOutcome, VerifyRequest};
use crate::progress::{self, ProgressRecord};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "shipcheck".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Error body shared by every route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&OrchestratorError> for ErrorBody {
    fn from(err: &OrchestratorError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// HTTP status for an orchestration error
pub fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::DeploymentBusy(_) => StatusCode::CONFLICT,
        OrchestratorError::MissingManifest { .. } | OrchestratorError::PortBindingNotFound { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OrchestratorError::BuildFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::RepairUnavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error wrapper for handlers
pub struct ApiError(pub OrchestratorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(ErrorBody::from(&self.0))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

/// Deployments response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<DeploymentSnapshot>,
    pub total: usize,
}

/// Deployments handler
pub async fn deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let deployments = state.orchestrator.lifecycle().list().await;
    let total = deployments.len();
    Json(DeploymentsResponse { deployments, total })
}

/// Stop handler; unknown ids succeed too
pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.lifecycle().stop(&project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Verification response: the outcome or error plus every progress record
#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VerifyOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    pub events: Vec<ProgressRecord>,
}

/// Run one orchestration for the lifetime of the request.
///
/// A client that disconnects drops the orchestration, which then stops the
/// project's containers.
pub async fn verify_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse {
    let (sink, stream) = progress::channel(&request.project_id);
    let (result, events) = tokio::join!(
        state.orchestrator.verify(request, sink),
        stream.collect::<Vec<_>>()
    );

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(VerificationResponse {
                error: outcome.failure().as_ref().map(ErrorBody::from),
                outcome: Some(outcome),
                events,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(VerificationResponse {
                outcome: None,
                error: Some(ErrorBody::from(&e)),
                events,
            }),
        ),
    }
}
