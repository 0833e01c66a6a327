//! Container lifecycle manager

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::deploy::compose::{find_manifest, ComposePatcher, PortMap};
use crate::deploy::engine::{compose_project_name, ComposeProject, ContainerEngine};
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::health::HealthProber;
use crate::deploy::registry::{DeploymentLease, DeploymentRegistry};
use crate::errors::OrchestratorError;
use crate::models::deployment::DeploymentSnapshot;
use crate::models::report::VerificationReport;
use crate::progress::{ProgressEvent, ProgressSink};

/// Owns container deployments for every project id
pub struct LifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    patcher: ComposePatcher,
    prober: HealthProber,
    registry: DeploymentRegistry,
}

impl LifecycleManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, ports: PortMap, prober: HealthProber) -> Self {
        Self {
            engine,
            patcher: ComposePatcher::new(ports),
            prober,
            registry: DeploymentRegistry::new(ports),
        }
    }

    pub fn ports(&self) -> &PortMap {
        self.patcher.ports()
    }

    pub fn prober(&self) -> &HealthProber {
        &self.prober
    }

    /// Take exclusive ownership of a project id for a sequence of operations
    pub async fn acquire(&self, project_id: &str) -> Result<DeploymentLease, OrchestratorError> {
        self.registry.acquire(project_id).await
    }

    /// Build and start a project's containers.
    ///
    /// Prior containers of the same project are removed first. On success the
    /// deployment is `Starting`; health is awaited separately.
    pub async fn deploy(
        &self,
        lease: &DeploymentLease,
        project_dir: &Path,
        progress: &ProgressSink,
    ) -> Result<DeploymentSnapshot, OrchestratorError> {
        let project_id = lease.project_id().to_string();
        let manifest = find_manifest(project_dir).await?;

        // An interrupted flow may have left the record mid-operation
        if lease.status().await.is_active() {
            lease.transition(DeploymentEvent::Stop).await?;
        }
        lease.transition(DeploymentEvent::Build).await?;
        lease
            .update(|d| {
                d.project_dir = Some(project_dir.to_path_buf());
                d.compose_file = Some(manifest.clone());
            })
            .await;

        let name = compose_project_name(&project_id);
        if let Err(e) = self.engine.down(&name, None).await {
            // Usually there is simply nothing to remove
            warn!("Removing previous containers of {} failed: {}", project_id, e);
        }

        if let Err(e) = self.patcher.patch_file(&manifest).await {
            lease
                .transition(DeploymentEvent::BuildFailed(e.to_string()))
                .await?;
            return Err(e);
        }

        let project = ComposeProject {
            name,
            dir: project_dir.to_path_buf(),
            file: manifest,
        };
        let output = match self.engine.up(&project, progress).await {
            Ok(output) => output,
            Err(e) => {
                lease
                    .transition(DeploymentEvent::BuildFailed(e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        if !output.success {
            error!("Build of {} failed with exit code {:?}", project_id, output.exit_code);
            let err = OrchestratorError::BuildFailed {
                exit_code: output.exit_code,
                output_tail: output.tail,
            };
            lease
                .transition(DeploymentEvent::BuildFailed(err.to_string()))
                .await?;
            return Err(err);
        }

        lease.transition(DeploymentEvent::BuildSucceeded).await?;
        progress.emit(ProgressEvent::Starting {
            app_port: self.ports().app_port,
        });
        info!("Containers of {} started", project_id);
        Ok(lease.snapshot().await)
    }

    /// Delegate to the health prober and record the outcome
    pub async fn wait_for_health(
        &self,
        lease: &DeploymentLease,
        progress: &ProgressSink,
    ) -> Result<Duration, OrchestratorError> {
        lease.transition(DeploymentEvent::ProbeHealth).await?;
        let port = lease.read(|d| d.mapped_app_port).await;

        match self.prober.wait(port, progress).await {
            Ok(elapsed) => {
                lease.transition(DeploymentEvent::HealthPassed).await?;
                progress.emit(ProgressEvent::Healthy {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
                Ok(elapsed)
            }
            Err(e) => {
                lease
                    .transition(DeploymentEvent::HealthTimedOut(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    pub async fn begin_verification(&self, lease: &DeploymentLease) -> Result<(), OrchestratorError> {
        lease.transition(DeploymentEvent::Verify).await?;
        Ok(())
    }

    pub async fn finish_verification(
        &self,
        lease: &DeploymentLease,
        report: &VerificationReport,
    ) -> Result<(), OrchestratorError> {
        let event = match report.verdict() {
            Ok(()) => DeploymentEvent::VerifyPassed,
            Err(e) => DeploymentEvent::VerifyFailed(e.to_string()),
        };
        lease.transition(event).await?;
        Ok(())
    }

    /// Tear down containers while keeping the lease and registry entry
    pub async fn teardown(&self, lease: &DeploymentLease) -> Result<(), OrchestratorError> {
        let name = compose_project_name(lease.project_id());
        let file = lease.read(|d| d.compose_file.clone()).await;
        let result = self.engine.down(&name, file.as_deref()).await;
        lease.transition(DeploymentEvent::Stop).await?;
        result
    }

    /// Tear down a project and forget it. Unknown ids are a no-op.
    pub async fn stop(&self, project_id: &str) -> Result<(), OrchestratorError> {
        let Some(lease) = self.registry.acquire_existing(project_id).await else {
            return Ok(());
        };
        info!("Stopping deployment {}", project_id);
        let result = self.teardown(&lease).await;
        self.registry.release(lease).await;
        result
    }

    pub async fn list(&self) -> Vec<DeploymentSnapshot> {
        self.registry.snapshots().await
    }
}
