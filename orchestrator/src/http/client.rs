//! HTTP client for the generation backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::OrchestratorError;
use crate::models::repair::{RepairRequest, RepairResult};
use crate::models::report::VerificationReport;
use crate::repair::{EvidenceSink, RepairCollaborator};

/// HTTP client for backend communication
pub struct BackendClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl BackendClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OrchestratorError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| OrchestratorError::ConfigError(format!("invalid backend URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(OrchestratorError::ConfigError(format!(
                "unsupported backend URL scheme: {}",
                parsed.scheme()
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: parsed,
            api_token: None,
        })
    }

    /// Authenticate requests with a bearer token
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// URL of a per-project endpoint; the id is percent-encoded as one segment
    pub fn project_url(&self, project_id: &str, endpoint: &str) -> Result<Url, OrchestratorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OrchestratorError::ConfigError(format!("backend URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["projects", project_id, endpoint]);
        Ok(url)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> Result<T, OrchestratorError> {
        let response = self.send_post(url, body).await?;
        let body = response.json().await?;
        Ok(body)
    }

    /// Make a POST request whose response body is irrelevant
    pub async fn post_discard<B: Serialize>(&self, url: Url, body: &B) -> Result<(), OrchestratorError> {
        self.send_post(url, body).await?;
        Ok(())
    }

    async fn send_post<B: Serialize>(&self, url: Url, body: &B) -> Result<Response, OrchestratorError> {
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(OrchestratorError::ServerError(format!("{}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl EvidenceSink for BackendClient {
    async fn submit(&self, project_id: &str, report: &VerificationReport) -> Result<(), OrchestratorError> {
        let url = self.project_url(project_id, "test-results")?;
        self.post_discard(url, report).await
    }
}

#[async_trait]
impl RepairCollaborator for BackendClient {
    async fn repair(&self, request: &RepairRequest) -> Result<RepairResult, OrchestratorError> {
        let url = self.project_url(&request.project_id, "repair")?;
        self.post(url, request)
            .await
            .map_err(|e| OrchestratorError::RepairUnavailable(e.to_string()))
    }
}
