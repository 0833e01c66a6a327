//! Deploy, verify and repair until the project passes or the budget runs out

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::deploy::lifecycle::LifecycleManager;
use crate::deploy::registry::DeploymentLease;
use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::models::api_spec::ApiSpec;
use crate::models::repair::RepairRequest;
use crate::models::report::{CheckResult, VerificationReport};
use crate::orchestrate::guard::CleanupGuard;
use crate::orchestrate::state::{RepairLoop, Verdict, MAX_ATTEMPTS};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::repair::{EvidenceSink, RepairCollaborator};
use crate::verify::verifier::FunctionalVerifier;

/// Name of the check reported when the service never became healthy
pub const SERVICE_HEALTH_CHECK: &str = "service health";

/// Caller-facing input of one orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub project_id: String,
    pub project_dir: PathBuf,
    pub api_spec: ApiSpec,
}

/// Result of an orchestration that ran to the end of its loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub final_project_dir: PathBuf,
    pub report: VerificationReport,
    pub attempts: u32,
}

impl VerifyOutcome {
    /// `AttemptsExhausted` for a loop that ended without a passing report
    pub fn failure(&self) -> Option<OrchestratorError> {
        (!self.success).then(|| OrchestratorError::AttemptsExhausted(self.attempts))
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub max_attempts: u32,
    /// Host the deployed services are reached on
    pub service_host: String,
    pub verifier_timeout: Duration,
    /// Only temporary trees under this directory are removed
    pub temp_root: PathBuf,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            service_host: "localhost".to_string(),
            verifier_timeout: Duration::from_secs(10),
            temp_root: std::env::temp_dir(),
        }
    }
}

/// Per-run mutable state
struct Run {
    project_dir: PathBuf,
    /// Repaired tree owned by us, removed once superseded
    temp_dir: Option<PathBuf>,
}

/// Retry/repair controller
pub struct Orchestrator {
    lifecycle: Arc<LifecycleManager>,
    repair: Arc<dyn RepairCollaborator>,
    evidence: Arc<dyn EvidenceSink>,
    options: ControllerOptions,
}

impl Orchestrator {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        repair: Arc<dyn RepairCollaborator>,
        evidence: Arc<dyn EvidenceSink>,
        options: ControllerOptions,
    ) -> Self {
        let max_attempts = options.max_attempts.clamp(1, MAX_ATTEMPTS);
        Self {
            lifecycle,
            repair,
            evidence,
            options: ControllerOptions {
                max_attempts,
                ..options
            },
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Run one orchestration to completion.
    ///
    /// Emits exactly one terminal event on `progress`: `complete` when the loop
    /// ran to the end (passed or not), `error` otherwise.
    pub async fn verify(
        &self,
        request: VerifyRequest,
        progress: ProgressSink,
    ) -> Result<VerifyOutcome, OrchestratorError> {
        let result = self.run(&request, &progress).await;
        match &result {
            Ok(outcome) => {
                info!(
                    "Orchestration of {} finished: success={} attempts={}",
                    request.project_id, outcome.success, outcome.attempts
                );
                progress.emit(ProgressEvent::Complete {
                    success: outcome.success,
                    attempts: outcome.attempts,
                });
            }
            Err(e) => {
                error!("Orchestration of {} failed: {}", request.project_id, e);
                progress.emit(ProgressEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Like [`Orchestrator::verify`], abandoned when `shutdown` resolves first.
    ///
    /// Abandoning drops the in-flight run, whose guard stops the project.
    pub async fn verify_until<F>(
        &self,
        request: VerifyRequest,
        progress: ProgressSink,
        shutdown: F,
    ) -> Result<VerifyOutcome, OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        let project_id = request.project_id.clone();
        let sink = progress.clone();
        tokio::select! {
            result = self.verify(request, progress) => result,
            _ = shutdown => {
                let err = OrchestratorError::Cancelled(format!("orchestration of {} interrupted", project_id));
                warn!("{}", err);
                sink.emit(ProgressEvent::Error {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run(&self, request: &VerifyRequest, progress: &ProgressSink) -> Result<VerifyOutcome, OrchestratorError> {
        let lease = self.lifecycle.acquire(&request.project_id).await?;
        let mut guard = CleanupGuard::new(self.lifecycle.clone(), &request.project_id);
        let mut run = Run {
            project_dir: request.project_dir.clone(),
            temp_dir: None,
        };

        let result = self.drive(&lease, request, progress, &mut run, &mut guard).await;
        if let Err(e) = &result {
            // Cleanup never masks the primary error
            if let Err(down) = self.lifecycle.teardown(&lease).await {
                warn!("Teardown after {} failed: {}", e.kind(), down);
            }
            if let Some(dir) = run.temp_dir.take() {
                remove_temp_dir(&dir).await;
            }
        }
        guard.disarm();
        result
    }

    async fn drive(
        &self,
        lease: &DeploymentLease,
        request: &VerifyRequest,
        progress: &ProgressSink,
        run: &mut Run,
        guard: &mut CleanupGuard,
    ) -> Result<VerifyOutcome, OrchestratorError> {
        let mut repair_loop = RepairLoop::new(self.options.max_attempts);

        loop {
            let attempt = repair_loop.attempt()?;
            info!(
                "Attempt {}/{} for {} from {}",
                attempt,
                repair_loop.max_attempts(),
                request.project_id,
                run.project_dir.display()
            );
            progress.emit(ProgressEvent::Deploying {
                attempt,
                max_attempts: repair_loop.max_attempts(),
                project_dir: run.project_dir.clone(),
            });

            self.lifecycle.deploy(lease, &run.project_dir, progress).await?;
            let report = self.health_then_verify(lease, &request.api_spec, progress).await?;

            if let Err(e) = self.evidence.submit(&request.project_id, &report).await {
                warn!("Submitting report of attempt {} failed: {}", attempt, e);
            }

            match repair_loop.record(report.passed)? {
                Verdict::Succeeded { attempts } => {
                    return Ok(self.outcome(run, report, attempts, true));
                }
                Verdict::Exhausted { attempts } => {
                    let outcome = self.outcome(run, report, attempts, false);
                    if let Some(err) = outcome.failure() {
                        warn!("{} for {}, containers left running", err, request.project_id);
                    }
                    return Ok(outcome);
                }
                Verdict::NeedsRepair { attempt } => {
                    if let Err(e) = self.lifecycle.teardown(lease).await {
                        warn!("Stopping {} before repair failed: {}", request.project_id, e);
                    }

                    let repair_request = RepairRequest::from_report(&request.project_id, attempt, &report);
                    info!(
                        "Requesting repair of {} ({} failed checks)",
                        request.project_id,
                        repair_request.failed_checks.len()
                    );
                    let repaired = self.repair.repair(&repair_request).await.map_err(|e| match e {
                        OrchestratorError::RepairUnavailable(_) => e,
                        other => OrchestratorError::RepairUnavailable(other.to_string()),
                    })?;

                    if let Some(previous) = run.temp_dir.take() {
                        if !repaired.project_dir.starts_with(&previous) {
                            remove_temp_dir(&previous).await;
                        }
                    }
                    let owned = repaired.temporary && self.owns_tree(request, &repaired.project_dir).await;
                    if repaired.temporary && !owned {
                        warn!(
                            "Repaired tree {} is outside {}, it will not be removed",
                            repaired.project_dir.display(),
                            self.options.temp_root.display()
                        );
                    }
                    run.project_dir = repaired.project_dir;
                    run.temp_dir = owned.then(|| run.project_dir.clone());
                    guard.set_temp_dir(run.temp_dir.clone());

                    repair_loop.advance()?;
                }
            }
        }
    }

    /// Health gate followed by the smoke suite.
    ///
    /// An unhealthy service yields a failed report with a single synthetic
    /// check instead of an error, so it goes through repair like any failure.
    async fn health_then_verify(
        &self,
        lease: &DeploymentLease,
        api_spec: &ApiSpec,
        progress: &ProgressSink,
    ) -> Result<VerificationReport, OrchestratorError> {
        match self.lifecycle.wait_for_health(lease, progress).await {
            Ok(_) => {}
            Err(e @ OrchestratorError::HealthTimeout { .. }) => {
                warn!("{}", e);
                return Ok(unhealthy_report(&e));
            }
            Err(e) => return Err(e),
        }

        let port = lease.read(|d| d.mapped_app_port).await;
        let base_url = format!("http://{}:{}", self.options.service_host, port);
        let verifier = FunctionalVerifier::new(&base_url, self.options.verifier_timeout)?;

        self.lifecycle.begin_verification(lease).await?;
        let report = verifier.run_full_suite(api_spec, progress).await;
        self.lifecycle.finish_verification(lease, &report).await?;
        match report.verdict() {
            Ok(()) => info!("Verification against {} passed", base_url),
            Err(e) => info!("Verification against {}: {}", base_url, e),
        }
        Ok(report)
    }

    /// Whether a repaired tree may be removed once superseded.
    ///
    /// It must sit strictly below the temp root and must not contain the
    /// caller's tree.
    async fn owns_tree(&self, request: &VerifyRequest, dir: &Path) -> bool {
        let root = canonical(&self.options.temp_root).await;
        let dir = canonical(dir).await;
        let caller = canonical(&request.project_dir).await;
        dir != root && dir.starts_with(&root) && !caller.starts_with(&dir)
    }

    fn outcome(&self, run: &Run, report: VerificationReport, attempts: u32, success: bool) -> VerifyOutcome {
        VerifyOutcome {
            success,
            final_project_dir: run.project_dir.clone(),
            report,
            attempts,
        }
    }
}

/// Report standing in for a suite that could not run
pub fn unhealthy_report(err: &OrchestratorError) -> VerificationReport {
    let elapsed_ms = match err {
        OrchestratorError::HealthTimeout { elapsed_ms, .. } => *elapsed_ms,
        _ => 0,
    };
    let check = CheckResult {
        name: SERVICE_HEALTH_CHECK.to_string(),
        endpoint: "/health".to_string(),
        method: "GET".to_string(),
        passed: false,
        status_code: None,
        error_message: Some(format!("service unhealthy: {}", err)),
        elapsed_ms,
    };
    VerificationReport::from_results(vec![check], elapsed_ms)
}

async fn canonical(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

async fn remove_temp_dir(dir: &Path) {
    match Dir::new(dir).delete().await {
        Ok(()) => info!("Removed temporary tree {}", dir.display()),
        Err(e) => warn!("Removing {} failed: {}", dir.display(), e),
    }
}
