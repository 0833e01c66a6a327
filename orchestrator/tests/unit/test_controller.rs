//! Retry/repair controller scenarios

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use shipcheck::deploy::fsm::DeploymentStatus;
use shipcheck::errors::OrchestratorError;
use shipcheck::models::repair::FailedCheck;
use shipcheck::orchestrate::controller::SERVICE_HEALTH_CHECK;
use shipcheck::orchestrate::{ControllerOptions, Orchestrator, VerifyRequest};
use shipcheck::progress::{self, ProgressEvent, ProgressRecord};

use crate::common::{
    api_spec, lifecycle, project_dir, spawn_service, FakeEngine, FakeRepair, MockService, RecordingSink, COMPOSE,
};

struct Harness {
    engine: Arc<FakeEngine>,
    repair: Arc<FakeRepair>,
    evidence: Arc<RecordingSink>,
    orchestrator: Orchestrator,
    service: MockService,
    project: tempfile::TempDir,
}

impl Harness {
    fn request(&self) -> VerifyRequest {
        VerifyRequest {
            project_id: "proj-1".to_string(),
            project_dir: self.project.path().to_path_buf(),
            api_spec: api_spec(true),
        }
    }

    async fn verify(&self) -> (Result<shipcheck::orchestrate::VerifyOutcome, OrchestratorError>, Vec<ProgressRecord>) {
        let (sink, stream) = progress::channel("proj-1");
        tokio::join!(self.orchestrator.verify(self.request(), sink), stream.collect::<Vec<_>>())
    }
}

async fn harness(repair: FakeRepair) -> Harness {
    let service = spawn_service().await;
    harness_with(repair, service).await
}

fn options() -> ControllerOptions {
    ControllerOptions {
        service_host: "127.0.0.1".to_string(),
        verifier_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

async fn harness_with(repair: FakeRepair, service: MockService) -> Harness {
    harness_with_options(repair, service, options()).await
}

async fn harness_with_options(repair: FakeRepair, service: MockService, options: ControllerOptions) -> Harness {
    let engine = Arc::new(FakeEngine::default());
    let repair = Arc::new(repair);
    let evidence = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(
        lifecycle(engine.clone(), service.port()),
        repair.clone(),
        evidence.clone(),
        options,
    );

    Harness {
        engine,
        repair,
        evidence,
        orchestrator,
        service,
        project: project_dir(),
    }
}

fn deploy_attempts(records: &[ProgressRecord]) -> Vec<u32> {
    records
        .iter()
        .filter_map(|r| match r.event {
            ProgressEvent::Deploying { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_first_attempt_passes() {
    let h = harness(FakeRepair::new(5)).await;

    let (result, records) = h.verify().await;
    let outcome = result.unwrap();

    assert!(outcome.success);
    assert!(outcome.failure().is_none());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.final_project_dir, h.project.path());
    assert!(outcome.report.passed);
    assert!(h.repair.requests().is_empty());
    assert_eq!(h.engine.up_count(), 1);
    assert_eq!(h.evidence.reports().len(), 1);

    // Ordered, gap-free, single terminal record
    assert!(records.iter().enumerate().all(|(i, r)| r.seq == i as u64));
    assert_eq!(deploy_attempts(&records), vec![1]);
    assert!(matches!(
        records.last().map(|r| &r.event),
        Some(ProgressEvent::Complete { success: true, attempts: 1 })
    ));
    assert_eq!(records.iter().filter(|r| r.event.is_terminal()).count(), 1);

    // Containers stay up for the caller
    let listed = h.orchestrator.lifecycle().list().await;
    assert_eq!(listed[0].status, DeploymentStatus::Healthy);
}

#[tokio::test]
async fn test_every_attempt_fails() {
    let h = harness(FakeRepair::new(5)).await;
    h.service.flags.broken_create.store(true, Ordering::SeqCst);

    let (result, records) = h.verify().await;
    let outcome = result.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert!(matches!(outcome.failure(), Some(OrchestratorError::AttemptsExhausted(3))));
    assert_eq!(h.engine.up_count(), 3);
    assert_eq!(deploy_attempts(&records), vec![1, 2, 3]);

    let requests = h.repair.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].attempt_number, 1);
    assert_eq!(requests[1].attempt_number, 2);
    assert_eq!(requests[0].failed_checks.len(), 1);
    assert_eq!(requests[0].failed_checks[0].method, "POST");
    assert_eq!(requests[0].failed_checks[0].endpoint, "/items");

    // The last report is returned, from the last repaired tree
    let reports = h.evidence.reports();
    assert_eq!(reports.len(), 3);
    assert_eq!(outcome.report, reports[2]);
    assert!(outcome.final_project_dir.ends_with("attempt-3"));
    assert_eq!(h.engine.up_dirs()[2], outcome.final_project_dir);

    assert!(matches!(
        records.last().map(|r| &r.event),
        Some(ProgressEvent::Complete { success: false, attempts: 3 })
    ));

    // Left running after the last attempt: 3 pre-deploy downs + 2 repair teardowns
    assert_eq!(h.engine.downs.load(Ordering::SeqCst), 5);
    let listed = h.orchestrator.lifecycle().list().await;
    assert_eq!(listed[0].status, DeploymentStatus::Failed);
    assert_eq!(
        listed[0].last_error.as_deref(),
        Some("Verification failed: 1 of 5 checks failed")
    );
}

#[tokio::test]
async fn test_repair_failure_stops_the_loop() {
    let h = harness(FakeRepair::new(1)).await;
    h.service.flags.broken_create.store(true, Ordering::SeqCst);

    let (result, records) = h.verify().await;
    let err = result.unwrap_err();

    assert!(matches!(err, OrchestratorError::RepairUnavailable(_)));
    assert!(!err.is_recoverable());
    assert_eq!(h.engine.up_count(), 2);
    assert_eq!(h.repair.requests().len(), 2);
    assert_eq!(deploy_attempts(&records), vec![1, 2]);

    match records.last().map(|r| &r.event) {
        Some(ProgressEvent::Error { kind, .. }) => assert_eq!(kind, "repair_unavailable"),
        other => panic!("unexpected terminal event: {other:?}"),
    }
}

#[tokio::test]
async fn test_unhealthy_service_enters_repair() {
    let service = spawn_service().await;
    service.flags.unhealthy.store(true, Ordering::SeqCst);
    let flags = service.flags.clone();
    let repair = FakeRepair::with_hook(5, move || flags.unhealthy.store(false, Ordering::SeqCst));
    let h = harness_with(repair, service).await;

    let (result, records) = h.verify().await;
    let outcome = result.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(deploy_attempts(&records), vec![1, 2]);

    let requests = h.repair.requests();
    assert_eq!(requests.len(), 1);
    let FailedCheck {
        method,
        endpoint,
        error_message,
    } = &requests[0].failed_checks[0];
    assert_eq!(method, "GET");
    assert_eq!(endpoint, "/health");
    assert!(error_message.starts_with("service unhealthy"));

    let reports = h.evidence.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].results.len(), 1);
    assert_eq!(reports[0].results[0].name, SERVICE_HEALTH_CHECK);
}

#[tokio::test]
async fn test_build_failure_is_fatal() {
    let h = harness(FakeRepair::new(5)).await;
    h.engine.fail_builds.store(true, Ordering::SeqCst);

    let (result, records) = h.verify().await;
    let err = result.unwrap_err();

    assert!(matches!(err, OrchestratorError::BuildFailed { .. }));
    assert_eq!(h.engine.up_count(), 1);
    assert!(h.repair.requests().is_empty());
    // Pre-deploy down plus the best-effort teardown
    assert_eq!(h.engine.downs.load(Ordering::SeqCst), 2);
    assert!(records.iter().any(|r| matches!(r.event, ProgressEvent::Building { .. })));
    assert!(matches!(
        records.last().map(|r| &r.event),
        Some(ProgressEvent::Error { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_run_is_busy() {
    let h = harness(FakeRepair::new(5)).await;
    let lease = h.orchestrator.lifecycle().acquire("proj-1").await.unwrap();

    let (result, records) = h.verify().await;
    assert!(matches!(result, Err(OrchestratorError::DeploymentBusy(_))));
    assert_eq!(h.engine.up_count(), 0);
    assert_eq!(records.len(), 1);
    drop(lease);
}

#[tokio::test]
async fn test_superseded_temporary_trees_are_removed() {
    let mut repair = FakeRepair::new(5);
    repair.temporary = true;
    let h = harness(repair).await;
    h.service.flags.broken_create.store(true, Ordering::SeqCst);

    let (result, _records) = h.verify().await;
    let outcome = result.unwrap();

    let dirs = h.engine.up_dirs();
    assert_eq!(dirs.len(), 3);
    // The caller's tree is never ours to delete
    assert!(dirs[0].exists());
    assert!(!dirs[1].exists());
    assert!(dirs[2].exists());
    assert_eq!(outcome.final_project_dir, dirs[2]);
}

#[tokio::test]
async fn test_interrupted_run_is_cleaned_up() {
    let h = harness(FakeRepair::new(5)).await;
    *h.engine.up_delay.lock().unwrap() = Some(Duration::from_millis(500));

    let (sink, stream) = progress::channel("proj-1");
    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let (result, records) = tokio::join!(
        h.orchestrator.verify_until(h.request(), sink, shutdown),
        stream.collect::<Vec<_>>()
    );

    assert!(matches!(result, Err(OrchestratorError::Cancelled(_))));
    match records.last().map(|r| &r.event) {
        Some(ProgressEvent::Error { kind, .. }) => assert_eq!(kind, "cancelled"),
        other => panic!("unexpected terminal event: {other:?}"),
    }

    // The guard stops the project in the background
    let lifecycle = h.orchestrator.lifecycle();
    for _ in 0..50 {
        if lifecycle.list().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(lifecycle.list().await.is_empty());
    assert_eq!(h.engine.downs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_caller_tree_survives_temporary_repair_result() {
    let service = spawn_service().await;
    service.flags.broken_create.store(true, Ordering::SeqCst);
    let mut repair = FakeRepair::new(5);
    repair.temporary = true;
    let h = harness_with(repair, service).await;

    // The collaborator hands the caller's own tree back, marked temporary
    let scratch = tempfile::tempdir().unwrap();
    let replacement = scratch.path().join("replacement");
    std::fs::create_dir_all(&replacement).unwrap();
    std::fs::write(replacement.join("compose.yaml"), COMPOSE).unwrap();
    h.repair
        .scripted_dirs
        .lock()
        .unwrap()
        .extend([h.project.path().to_path_buf(), replacement.clone()]);

    let (result, _records) = h.verify().await;
    let outcome = result.unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.final_project_dir, replacement);
    assert!(h.project.path().join("compose.yaml").exists());
}

#[tokio::test]
async fn test_temporary_trees_outside_temp_root_are_kept() {
    let service = spawn_service().await;
    service.flags.broken_create.store(true, Ordering::SeqCst);
    let mut repair = FakeRepair::new(5);
    repair.temporary = true;

    let own_root = tempfile::tempdir().unwrap();
    let options = ControllerOptions {
        temp_root: own_root.path().to_path_buf(),
        ..options()
    };
    let h = harness_with_options(repair, service, options).await;

    let (result, _records) = h.verify().await;
    let outcome = result.unwrap();

    let dirs = h.engine.up_dirs();
    assert_eq!(dirs.len(), 3);
    assert!(dirs[1].exists());
    assert_eq!(outcome.final_project_dir, dirs[2]);
}
