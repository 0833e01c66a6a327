//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::engine::{ContainerEngine, DockerCompose};
use crate::deploy::health::HealthProber;
use crate::deploy::lifecycle::LifecycleManager;
use crate::errors::OrchestratorError;
use crate::http::client::BackendClient;
use crate::orchestrate::Orchestrator;
use crate::repair::{EvidenceSink, Offline, RepairCollaborator};

/// Main application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state against the local container engine
    pub async fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        info!("Initializing application state...");

        let engine = Arc::new(DockerCompose::detect(options.build_tail_bytes).await);

        let (repair, evidence): (Arc<dyn RepairCollaborator>, Arc<dyn EvidenceSink>) =
            match &options.backend.base_url {
                Some(base_url) => {
                    info!("Using backend at {}", base_url);
                    let client = Arc::new(
                        BackendClient::new(base_url, options.backend.timeout)?
                            .with_api_token(options.backend.api_token.clone()),
                    );
                    let repair: Arc<dyn RepairCollaborator> = client.clone();
                    let evidence: Arc<dyn EvidenceSink> = client;
                    (repair, evidence)
                }
                None => {
                    info!("No backend configured, repairs are unavailable");
                    let repair: Arc<dyn RepairCollaborator> = Arc::new(Offline);
                    let evidence: Arc<dyn EvidenceSink> = Arc::new(Offline);
                    (repair, evidence)
                }
            };

        Self::with_parts(options, engine, repair, evidence)
    }

    /// Assemble state from explicit collaborators
    pub fn with_parts(
        options: &AppOptions,
        engine: Arc<dyn ContainerEngine>,
        repair: Arc<dyn RepairCollaborator>,
        evidence: Arc<dyn EvidenceSink>,
    ) -> Result<Self, OrchestratorError> {
        let prober = HealthProber::new(&options.controller.service_host, options.health)?;
        let lifecycle = Arc::new(LifecycleManager::new(engine, options.ports, prober));
        let orchestrator = Orchestrator::new(lifecycle, repair, evidence, options.controller.clone());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Report deployments left running; they stay up for inspection
    pub async fn shutdown(&self) {
        info!("Shutting down application state...");
        for deployment in self.orchestrator.lifecycle().list().await {
            info!(
                "Deployment {} left {:?} on port {}",
                deployment.project_id, deployment.status, deployment.mapped_app_port
            );
        }
    }
}
